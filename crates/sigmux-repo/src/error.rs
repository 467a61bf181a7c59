use std::path::PathBuf;

/// Errors raised by the repository collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The URI does not resolve to a recording or signal.
    #[error("resource not found: <{0}>")]
    NotFound(String),

    /// The URI already names a resource in the repository.
    #[error("resource <{0}> already in repository")]
    AlreadyExists(String),

    /// A units token has no canonical identifier.
    #[error("unknown units {0:?}")]
    UnknownUnits(String),

    /// A backing-store I/O fault.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A recording manifest could not be read or written.
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The recording has already been finalized.
    #[error("recording is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, RepoError>;
