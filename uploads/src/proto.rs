//! Wire messages framing upload traffic toward the server.

use bytes::Bytes;

/// Flow id carried by every upload packet, routing it to the server-side
/// transfer handler.
pub const TRANSFER_WELL_KNOWN_FLOW_ID: u64 = 5;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PathSpec {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, repeated, tag = "2")]
    pub components: Vec<String>,
    #[prost(string, tag = "3")]
    pub accessor: String,
}

/// One contiguous region of the original file as transmitted.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BufferRange {
    /// Offset of this range's bytes within the transmitted stream.
    #[prost(int64, tag = "1")]
    pub file_offset: i64,
    /// Offset of this range within the original file.
    #[prost(int64, tag = "2")]
    pub original_offset: i64,
    /// Transmitted length; zero for a sparse hole.
    #[prost(int64, tag = "3")]
    pub file_length: i64,
    /// Length of the range in the original file.
    #[prost(int64, tag = "4")]
    pub length: i64,
}

/// Mapping from the transmitted stream back to the original sparse layout.
/// Applying the ranges in order reconstructs the source byte-for-byte.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SparseIndex {
    #[prost(message, repeated, tag = "1")]
    pub ranges: Vec<BufferRange>,
}

/// One framed chunk of an upload. Exactly one packet per upload carries
/// `eof`; the index, when present, rides on that packet only.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileBuffer {
    #[prost(message, optional, tag = "1")]
    pub pathspec: Option<PathSpec>,
    /// Offset of this chunk within the transmitted stream.
    #[prost(uint64, tag = "2")]
    pub offset: u64,
    /// Size of the original file.
    #[prost(uint64, tag = "3")]
    pub size: u64,
    /// Bytes transmitted for the whole upload.
    #[prost(uint64, tag = "4")]
    pub stored_size: u64,
    #[prost(bool, tag = "5")]
    pub is_sparse: bool,
    #[prost(int64, tag = "6")]
    pub mtime: i64,
    #[prost(int64, tag = "7")]
    pub atime: i64,
    #[prost(int64, tag = "8")]
    pub ctime: i64,
    #[prost(int64, tag = "9")]
    pub btime: i64,
    #[prost(bytes = "bytes", tag = "10")]
    pub data: Bytes,
    #[prost(message, optional, tag = "11")]
    pub index: Option<SparseIndex>,
    #[prost(bool, tag = "12")]
    pub eof: bool,
    /// Sequence number of this upload within its flow.
    #[prost(int64, tag = "13")]
    pub upload_number: i64,
}

/// Envelope queued into the responder for transmission.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(message, optional, tag = "2")]
    pub file_buffer: Option<FileBuffer>,
}
