use std::collections::HashMap;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// A writer into the filestore. Contents become visible once
/// [FileWriter::complete] is called; abandoned writers leave the previous
/// contents (or a partial file, backend depending) in place.
#[async_trait]
pub trait FileWriter: AsyncWrite + Send + Unpin {
    /// Drop anything previously stored under this path.
    async fn truncate(&mut self) -> io::Result<()>;

    /// Flush and publish the written contents.
    async fn complete(&mut self) -> io::Result<()>;
}

/// Factory for writers under one org's filestore.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn write_file(&self, path: &str) -> io::Result<Box<dyn FileWriter>>;
}

/// Filestore keeping contents in memory, keyed by path.
#[derive(Default, Clone)]
pub struct MemoryFileStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryFileStore {
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn write_file(&self, path: &str) -> io::Result<Box<dyn FileWriter>> {
        Ok(Box::new(MemoryFileWriter {
            files: self.files.clone(),
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }
}

pub struct MemoryFileWriter {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    path: String,
    buf: Vec<u8>,
}

impl AsyncWrite for MemoryFileWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        b: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(self.buf.write(b))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl FileWriter for MemoryFileWriter {
    async fn truncate(&mut self) -> io::Result<()> {
        self.buf.clear();
        Ok(())
    }

    async fn complete(&mut self) -> io::Result<()> {
        let mut files = self.files.write().unwrap();
        files.insert(self.path.clone(), std::mem::take(&mut self.buf));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::{FileStore, MemoryFileStore};

    #[tokio::test]
    async fn contents_visible_after_complete() {
        let store = MemoryFileStore::default();

        let mut writer = store.write_file("public/abc").await.expect("must open");
        writer.write_all(b"stale").await.expect("write must succeed");
        writer.truncate().await.expect("truncate must succeed");
        writer.write_all(b"payload").await.expect("write must succeed");

        assert_eq!(None, store.get("public/abc"), "not yet published");

        writer.complete().await.expect("complete must succeed");
        assert_eq!(Some(b"payload".to_vec()), store.get("public/abc"));
    }
}
