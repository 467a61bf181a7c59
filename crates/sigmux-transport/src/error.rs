use std::path::PathBuf;

/// Errors that can occur on the named-pipe transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the FIFO at the given path.
    #[error("failed to create fifo at {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open a pipe endpoint.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A path that should name a FIFO names something else.
    #[error("existing path is not a fifo: {path}")]
    NotAFifo { path: PathBuf },

    /// An I/O error occurred on the pipe.
    #[error("pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer end of the pipe has gone away.
    #[error("pipe closed by peer")]
    Closed,

    /// The operation was cancelled via the shared interrupt flag.
    #[error("interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, TransportError>;
