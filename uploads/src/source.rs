use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// A contiguous region of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Offset of the region within the file.
    pub offset: u64,
    /// Length of the region.
    pub length: u64,
    /// Whether the region is an unallocated hole.
    pub is_sparse: bool,
}

/// A file-like source handed to the uploader.
///
/// Sources that know their allocation map (raw NTFS reads, volume shadow
/// images) expose it through [UploadSource::ranges] and take the sparse
/// path; everything else streams densely.
pub trait UploadSource: AsyncRead + AsyncSeek + Send + Unpin {
    /// The allocation map of the source, in file order, if known.
    fn ranges(&self) -> Option<Vec<Range>> {
        None
    }
}

impl UploadSource for tokio::fs::File {}
impl<T: AsRef<[u8]> + Send + Unpin> UploadSource for io::Cursor<T> {}

/// Wraps a seekable reader with an explicit allocation map.
pub struct SparseSource<R> {
    inner: R,
    ranges: Vec<Range>,
}

impl<R> SparseSource<R> {
    pub fn new(inner: R, ranges: Vec<Range>) -> Self {
        Self { inner, ranges }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for SparseSource<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for SparseSource<R> {
    fn start_seek(mut self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

impl<R: AsyncRead + AsyncSeek + Send + Unpin> UploadSource for SparseSource<R> {
    fn ranges(&self) -> Option<Vec<Range>> {
        Some(self.ranges.clone())
    }
}
