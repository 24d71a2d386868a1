//! Streaming client uploader for the argus endpoint-monitoring platform.
//!
//! Collection queries hand file-like sources to the [Uploader], which frames
//! them into [proto::FileBuffer] packets and enqueues them on the flow's
//! [Responder] while computing SHA-256 and MD5 over the transmitted bytes.
//! Sources that know their allocation map take the sparse path: holes are
//! skipped on the wire and recorded in a [proto::SparseIndex] from which the
//! original file can be reconstructed byte-for-byte.

mod dedup;
mod errors;
pub mod proto;
mod responder;
mod source;
mod uploader;

pub use dedup::{UploadCache, UploadResponse};
pub use errors::UploadError;
pub use responder::{QueueResponder, Responder};
pub use source::{Range, SparseSource, UploadSource};
pub use uploader::{FileTimes, UploadRequest, Uploader};
