use thiserror::Error;

/// Errors surfaced by inventory operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The tool is declared neither locally nor in the parent inventory.
    #[error("tool {0} not declared in inventory")]
    NotFound(String),

    /// The tool has no url, github project or serve url to fetch from.
    #[error("tool {0} has no url defined - upload it manually")]
    NoSource(String),

    #[error("while resolving github release {project}: {reason}")]
    Resolution { project: String, reason: String },

    #[error("unable to download file from {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}
