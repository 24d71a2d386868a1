use thiserror::Error;

/// Errors aborting an upload. No partial result is cached on failure.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
