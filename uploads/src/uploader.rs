use bytes::BytesMut;
use data_encoding::HEXLOWER;
use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dedup::{UploadCache, UploadResponse};
use crate::proto::{
    BufferRange, Envelope, FileBuffer, PathSpec, SparseIndex, TRANSFER_WELL_KNOWN_FLOW_ID,
};
use crate::responder::Responder;
use crate::source::{Range, UploadSource};
use crate::UploadError;

/// Read and packet granularity.
const BUFFER_SIZE: u64 = 1024 * 1024;

/// Timestamps attached to every packet, nanoseconds since the epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTimes {
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
    pub btime: i64,
}

/// Parameters of one upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Path of the source on the endpoint.
    pub filename: &'a str,
    /// Accessor the source was opened through.
    pub accessor: &'a str,
    /// Name to store the file under; defaults to the source path.
    pub store_as_name: Option<&'a str>,
    /// Size the caller expects. Carried in packet headers but not verified
    /// against the bytes actually read.
    pub expected_size: u64,
    pub times: FileTimes,
}

/// Streams files from the endpoint into the flow's responder queue.
pub struct Uploader<R> {
    responder: R,
}

impl<R: Responder> Uploader<R> {
    pub fn new(responder: R) -> Self {
        Self { responder }
    }

    /// Upload a file, preferring the sparse path when the source knows its
    /// allocation map. The finished response is cached per scope under the
    /// store-as name; repeated uploads return it without reading again.
    pub async fn upload<S: UploadSource>(
        &self,
        token: &CancellationToken,
        cache: &UploadCache,
        request: &UploadRequest<'_>,
        reader: &mut S,
    ) -> Result<UploadResponse, UploadError> {
        let stored_name = request.store_as_name.unwrap_or(request.filename);

        if let Some(cached) = cache.get(stored_name) {
            debug!(stored_name, "deduplicated upload");
            return Ok(cached);
        }

        let upload_id = self.responder.next_upload_id();

        let result = match reader.ranges() {
            Some(ranges) => {
                self.upload_sparse(token, request, stored_name, upload_id, &ranges, reader)
                    .await?
            }
            None => {
                self.upload_dense(token, request, stored_name, upload_id, reader)
                    .await?
            }
        };

        cache.put(stored_name, &result);
        Ok(result)
    }

    async fn upload_dense<S: UploadSource>(
        &self,
        token: &CancellationToken,
        request: &UploadRequest<'_>,
        stored_name: &str,
        upload_id: i64,
        reader: &mut S,
    ) -> Result<UploadResponse, UploadError> {
        let mut result = self.response_stub(request, stored_name);

        let mut sha_sum = Sha256::new();
        let mut md5_sum = Md5::new();
        let mut offset = 0u64;

        loop {
            // A fresh allocation every iteration: earlier buffers may still
            // be queued in the responder and must not be overwritten.
            let mut buffer = BytesMut::zeroed(BUFFER_SIZE as usize);
            let read_bytes = reader.read(&mut buffer).await?;
            buffer.truncate(read_bytes);
            let data = buffer.freeze();

            sha_sum.update(&data);
            md5_sum.update(&data);

            let eof = read_bytes == 0;
            self.send(
                token,
                FileBuffer {
                    pathspec: Some(pathspec(stored_name, request.accessor)),
                    offset,
                    size: request.expected_size,
                    stored_size: request.expected_size,
                    mtime: request.times.mtime,
                    atime: request.times.atime,
                    ctime: request.times.ctime,
                    btime: request.times.btime,
                    data,
                    upload_number: upload_id,
                    eof,
                    ..Default::default()
                },
            )?;

            offset += read_bytes as u64;

            // The empty read was the EOF packet; hand the hashes back.
            if eof {
                result.size = offset;
                result.stored_size = offset;
                result.sha256 = HEXLOWER.encode(&sha_sum.finalize());
                result.md5 = HEXLOWER.encode(&md5_sum.finalize());
                return Ok(result);
            }
        }
    }

    async fn upload_sparse<S: UploadSource>(
        &self,
        token: &CancellationToken,
        request: &UploadRequest<'_>,
        stored_name: &str,
        upload_id: i64,
        ranges: &[Range],
        reader: &mut S,
    ) -> Result<UploadResponse, UploadError> {
        let mut result = self.response_stub(request, stored_name);

        let mut sha_sum = Sha256::new();
        let mut md5_sum = Md5::new();

        // Walk the allocation map once: size the transfer and build the
        // reconstruction index. Holes contribute no transmitted bytes.
        let mut index = SparseIndex::default();
        let mut expected_size = 0u64;
        let mut real_size = 0u64;
        let mut is_sparse = false;

        for range in ranges {
            index.ranges.push(BufferRange {
                file_offset: expected_size as i64,
                original_offset: range.offset as i64,
                file_length: if range.is_sparse {
                    0
                } else {
                    range.length as i64
                },
                length: range.length as i64,
            });

            if range.is_sparse {
                is_sparse = true;
            } else {
                expected_size += range.length;
            }
            real_size = real_size.max(range.offset + range.length);
        }

        let index = is_sparse.then_some(index);

        // Nothing allocated: a single placeholder packet carries the
        // metadata and, for a sparse file, the index.
        if expected_size == 0 {
            self.send(
                token,
                FileBuffer {
                    pathspec: Some(pathspec(stored_name, request.accessor)),
                    size: real_size,
                    stored_size: 0,
                    is_sparse,
                    index,
                    mtime: request.times.mtime,
                    eof: true,
                    upload_number: upload_id,
                    ..Default::default()
                },
            )?;

            result.size = real_size;
            result.sha256 = HEXLOWER.encode(&sha_sum.finalize());
            result.md5 = HEXLOWER.encode(&md5_sum.finalize());
            return Ok(result);
        }

        // Send the allocated ranges back to back; write_offset tracks the
        // position in the transmitted stream, not in the source.
        let mut write_offset = 0u64;

        for range in ranges.iter().filter(|r| !r.is_sparse) {
            reader.seek(SeekFrom::Start(range.offset)).await?;
            let mut to_read = range.length;

            while to_read > 0 {
                // Fresh allocation per chunk, as in the dense path.
                let chunk = to_read.min(BUFFER_SIZE);
                let mut buffer = BytesMut::zeroed(chunk as usize);
                let read_bytes = reader.read(&mut buffer).await?;
                if read_bytes == 0 {
                    // Source ended short of the declared range.
                    break;
                }
                buffer.truncate(read_bytes);
                let data = buffer.freeze();

                sha_sum.update(&data);
                md5_sum.update(&data);

                self.send(
                    token,
                    FileBuffer {
                        pathspec: Some(pathspec(stored_name, request.accessor)),
                        offset: write_offset,
                        size: real_size,
                        stored_size: expected_size,
                        is_sparse,
                        mtime: request.times.mtime,
                        data,
                        upload_number: upload_id,
                        ..Default::default()
                    },
                )?;

                to_read -= read_bytes as u64;
                write_offset += read_bytes as u64;
            }
        }

        // Exactly one EOF packet per upload; a sparse file carries its
        // index here.
        self.send(
            token,
            FileBuffer {
                pathspec: Some(pathspec(stored_name, request.accessor)),
                offset: write_offset,
                size: real_size,
                stored_size: expected_size,
                is_sparse,
                index,
                mtime: request.times.mtime,
                eof: true,
                upload_number: upload_id,
                ..Default::default()
            },
        )?;

        result.size = real_size;
        result.stored_size = write_offset;
        result.sha256 = HEXLOWER.encode(&sha_sum.finalize());
        result.md5 = HEXLOWER.encode(&md5_sum.finalize());
        Ok(result)
    }

    fn response_stub(&self, request: &UploadRequest<'_>, stored_name: &str) -> UploadResponse {
        UploadResponse {
            path: request.filename.to_string(),
            stored_name: stored_name.to_string(),
            components: path_components(stored_name),
            accessor: request.accessor.to_string(),
            ..Default::default()
        }
    }

    /// Enqueue one packet, honoring cancellation before it is handed off.
    fn send(&self, token: &CancellationToken, packet: FileBuffer) -> Result<(), UploadError> {
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        self.responder.add_response(Envelope {
            request_id: TRANSFER_WELL_KNOWN_FLOW_ID,
            file_buffer: Some(packet),
        });
        Ok(())
    }
}

fn pathspec(stored_name: &str, accessor: &str) -> PathSpec {
    PathSpec {
        path: stored_name.to_string(),
        components: path_components(stored_name),
        accessor: accessor.to_string(),
    }
}

/// Split a stored name into its path components.
fn path_components(path: &str) -> Vec<String> {
    path.split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use rstest::rstest;
    use tokio_util::sync::CancellationToken;

    use crate::dedup::UploadCache;
    use crate::proto::{Envelope, FileBuffer, TRANSFER_WELL_KNOWN_FLOW_ID};
    use crate::responder::QueueResponder;
    use crate::source::{Range, SparseSource};
    use crate::UploadError;

    use super::{path_components, FileTimes, UploadRequest, Uploader};

    const SHA256_HELLO: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const MD5_HELLO: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const SHA256_EMPTY: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const MD5_EMPTY: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const SHA256_ABCDXYZ: &str =
        "cb9d9b5a6ac26eb8fa6fed67fe06799f7a6e0d3243b26463e0a52f04eaad5b42";
    const MD5_ABCDXYZ: &str = "7e47aaead06e264604d280c74cf371e3";

    fn harness() -> (Uploader<Arc<QueueResponder>>, Arc<QueueResponder>) {
        let responder = Arc::new(QueueResponder::default());
        (Uploader::new(responder.clone()), responder)
    }

    fn request<'a>(filename: &'a str, expected_size: u64) -> UploadRequest<'a> {
        UploadRequest {
            filename,
            accessor: "file",
            store_as_name: None,
            expected_size,
            times: FileTimes {
                mtime: 1_700_000_000_000_000_000,
                ..Default::default()
            },
        }
    }

    fn packets(messages: &[Envelope]) -> Vec<&FileBuffer> {
        messages
            .iter()
            .map(|m| m.file_buffer.as_ref().expect("must carry a FileBuffer"))
            .collect()
    }

    /// Rebuild the original file from the transmitted stream and the index
    /// of the EOF packet.
    fn reconstruct(stream: &[u8], eof: &FileBuffer) -> Vec<u8> {
        let mut out = vec![0u8; eof.size as usize];
        for range in &eof.index.as_ref().expect("index must be present").ranges {
            let from = range.file_offset as usize;
            let to = range.original_offset as usize;
            let len = range.file_length as usize;
            out[to..to + len].copy_from_slice(&stream[from..from + len]);
        }
        out
    }

    #[rstest]
    #[case::unix("/etc/passwd", &["etc", "passwd"])]
    #[case::windows("C:\\Windows\\notepad.exe", &["C:", "Windows", "notepad.exe"])]
    #[case::relative_dot("./a/b", &["a", "b"])]
    fn components(#[case] path: &str, #[case] expected: &[&str]) {
        assert_eq!(expected.to_vec(), path_components(path));
    }

    #[tokio::test]
    async fn dense_upload_frames_and_hashes() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        let cache = UploadCache::default();

        let mut reader = Cursor::new(b"hello world".to_vec());
        let result = uploader
            .upload(&token, &cache, &request("/tmp/f", 11), &mut reader)
            .await
            .expect("upload must succeed");

        assert_eq!(11, result.size);
        assert_eq!(11, result.stored_size);
        assert_eq!(SHA256_HELLO, result.sha256);
        assert_eq!(MD5_HELLO, result.md5);
        assert_eq!("/tmp/f", result.path);
        assert_eq!(vec!["tmp".to_string(), "f".to_string()], result.components);

        let messages = responder.messages();
        let packets = packets(&messages);

        // One data packet, then the empty EOF packet.
        assert_eq!(2, packets.len());
        assert!(messages
            .iter()
            .all(|m| m.request_id == TRANSFER_WELL_KNOWN_FLOW_ID));

        assert_eq!(b"hello world".as_slice(), &packets[0].data[..]);
        assert_eq!(0, packets[0].offset);
        assert_eq!(11, packets[0].size);
        assert!(!packets[0].eof);
        assert_eq!(1_700_000_000_000_000_000, packets[0].mtime);

        assert!(packets[1].eof);
        assert!(packets[1].data.is_empty());
        assert_eq!(11, packets[1].offset);

        let transmitted: usize = packets.iter().map(|p| p.data.len()).sum();
        assert_eq!(result.stored_size as usize, transmitted);
        assert_eq!(1, packets.iter().filter(|p| p.eof).count());
    }

    #[tokio::test]
    async fn dense_upload_deduplicates_by_stored_name() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        let cache = UploadCache::default();

        let mut reader = Cursor::new(b"hello world".to_vec());
        let first = uploader
            .upload(&token, &cache, &request("/tmp/f", 11), &mut reader)
            .await
            .expect("upload must succeed");
        let sent = responder.drain().len();

        // The source is exhausted; a re-read would hash empty. The cache
        // must answer instead.
        let second = uploader
            .upload(&token, &cache, &request("/tmp/f", 11), &mut reader)
            .await
            .expect("upload must succeed");

        assert_eq!(first, second);
        assert!(responder.messages().is_empty(), "nothing re-sent");
        assert!(sent > 0);
    }

    #[tokio::test]
    async fn cancelled_upload_aborts_before_enqueue() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        token.cancel();
        let cache = UploadCache::default();

        let mut reader = Cursor::new(b"hello world".to_vec());
        let result = uploader
            .upload(&token, &cache, &request("/tmp/f", 11), &mut reader)
            .await;

        assert!(matches!(result, Err(UploadError::Cancelled)));
        assert!(responder.messages().is_empty());
        assert!(cache.get("/tmp/f").is_none(), "failures are not cached");
    }

    #[tokio::test]
    async fn sparse_upload_builds_index() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        let cache = UploadCache::default();

        // 203-byte file: "ABCD" at 0, a hole at 100, "XYZ" at 200.
        let mut data = vec![0u8; 203];
        data[..4].copy_from_slice(b"ABCD");
        data[200..].copy_from_slice(b"XYZ");
        let ranges = vec![
            Range {
                offset: 0,
                length: 4,
                is_sparse: false,
            },
            Range {
                offset: 100,
                length: 2,
                is_sparse: true,
            },
            Range {
                offset: 200,
                length: 3,
                is_sparse: false,
            },
        ];
        let mut reader = SparseSource::new(Cursor::new(data.clone()), ranges);

        let result = uploader
            .upload(&token, &cache, &request("/tmp/sparse", 203), &mut reader)
            .await
            .expect("upload must succeed");

        assert_eq!(203, result.size);
        assert_eq!(7, result.stored_size);
        assert_eq!(SHA256_ABCDXYZ, result.sha256);
        assert_eq!(MD5_ABCDXYZ, result.md5);

        let messages = responder.messages();
        let packets = packets(&messages);
        assert_eq!(3, packets.len());
        assert_eq!(1, packets.iter().filter(|p| p.eof).count());

        assert_eq!(b"ABCD".as_slice(), &packets[0].data[..]);
        assert_eq!(0, packets[0].offset);
        assert_eq!(b"XYZ".as_slice(), &packets[1].data[..]);
        assert_eq!(4, packets[1].offset);
        assert!(packets.iter().all(|p| p.is_sparse));
        assert!(packets.iter().all(|p| p.size == 203));

        let eof = packets[2];
        assert!(eof.eof);
        assert_eq!(7, eof.offset);
        assert_eq!(7, eof.stored_size);
        let index = eof.index.as_ref().expect("sparse upload carries an index");
        let rows: Vec<(i64, i64, i64, i64)> = index
            .ranges
            .iter()
            .map(|r| (r.file_offset, r.original_offset, r.file_length, r.length))
            .collect();
        assert_eq!(vec![(0, 0, 4, 4), (4, 100, 0, 2), (4, 200, 3, 3)], rows);

        // Index packets only appear on the EOF packet.
        assert!(packets[..2].iter().all(|p| p.index.is_none()));

        // Reconstruction law: the index applied to the transmitted stream
        // reproduces the original file byte-for-byte.
        let stream: Vec<u8> = packets.iter().flat_map(|p| p.data.to_vec()).collect();
        assert_eq!(result.stored_size as usize, stream.len());
        assert_eq!(data, reconstruct(&stream, eof));
    }

    #[tokio::test]
    async fn sparse_upload_of_only_holes_sends_placeholder() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        let cache = UploadCache::default();

        let ranges = vec![Range {
            offset: 0,
            length: 100,
            is_sparse: true,
        }];
        let mut reader = SparseSource::new(Cursor::new(vec![0u8; 100]), ranges);

        let result = uploader
            .upload(&token, &cache, &request("/tmp/holes", 100), &mut reader)
            .await
            .expect("upload must succeed");

        assert_eq!(100, result.size);
        assert_eq!(0, result.stored_size);
        assert_eq!(SHA256_EMPTY, result.sha256);
        assert_eq!(MD5_EMPTY, result.md5);

        let messages = responder.messages();
        let packets = packets(&messages);
        assert_eq!(1, packets.len());
        assert!(packets[0].eof);
        assert!(packets[0].is_sparse);
        assert_eq!(100, packets[0].size);
        assert_eq!(0, packets[0].stored_size);
        assert!(packets[0].index.is_some());
    }

    #[tokio::test]
    async fn contiguous_ranges_are_not_marked_sparse() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        let cache = UploadCache::default();

        let ranges = vec![Range {
            offset: 0,
            length: 11,
            is_sparse: false,
        }];
        let mut reader = SparseSource::new(Cursor::new(b"hello world".to_vec()), ranges);

        let result = uploader
            .upload(&token, &cache, &request("/tmp/f", 11), &mut reader)
            .await
            .expect("upload must succeed");

        assert_eq!(SHA256_HELLO, result.sha256);
        assert_eq!(11, result.stored_size);

        let messages = responder.messages();
        let packets = packets(&messages);
        assert!(packets.iter().all(|p| !p.is_sparse));
        let eof = packets.last().expect("must have packets");
        assert!(eof.eof);
        assert!(
            eof.index.is_none(),
            "a fully allocated file needs no index"
        );
    }

    #[tokio::test]
    async fn store_as_name_overrides_path() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();
        let cache = UploadCache::default();

        let mut req = request("/tmp/f", 11);
        req.store_as_name = Some("uploads/renamed");

        let mut reader = Cursor::new(b"hello world".to_vec());
        let result = uploader
            .upload(&token, &cache, &req, &mut reader)
            .await
            .expect("upload must succeed");

        assert_eq!("/tmp/f", result.path);
        assert_eq!("uploads/renamed", result.stored_name);
        assert!(cache.get("uploads/renamed").is_some());
        assert!(cache.get("/tmp/f").is_none());

        let messages = responder.messages();
        let spec = messages[0]
            .file_buffer
            .as_ref()
            .and_then(|p| p.pathspec.as_ref())
            .expect("must carry a pathspec");
        assert_eq!("uploads/renamed", spec.path);
        assert_eq!(vec!["uploads".to_string(), "renamed".to_string()], spec.components);
    }

    #[tokio::test]
    async fn upload_ids_are_distinct_per_upload() {
        let (uploader, responder) = harness();
        let token = CancellationToken::new();

        let mut reader = Cursor::new(b"a".to_vec());
        uploader
            .upload(&token, &UploadCache::default(), &request("/a", 1), &mut reader)
            .await
            .expect("upload must succeed");
        let mut reader = Cursor::new(b"b".to_vec());
        uploader
            .upload(&token, &UploadCache::default(), &request("/b", 1), &mut reader)
            .await
            .expect("upload must succeed");

        let ids: Vec<i64> = responder
            .messages()
            .iter()
            .filter_map(|m| m.file_buffer.as_ref())
            .filter(|p| p.eof)
            .map(|p| p.upload_number)
            .collect();
        assert_eq!(2, ids.len());
        assert_ne!(ids[0], ids[1]);
    }
}
