/// Errors that can occur during frame encoding, decoding, or queueing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The preamble exceeds the configured maximum size.
    #[error("preamble too large ({size} bytes, max {max})")]
    PreambleTooLarge { size: usize, max: usize },

    /// A record could not be decoded. Recoverable: the receiving side
    /// logs and skips the record.
    #[error("malformed record ({reason}): {fragment:?}")]
    BadRecord {
        reason: &'static str,
        fragment: String,
    },

    /// A record carries the wrong number of value fields.
    #[error("record has {got} value fields, expected {expected}")]
    FieldCount { got: usize, expected: usize },

    /// Non-uniform point lists have no fixed-width representation.
    #[error("non-uniform point list cannot be packed in binary mode")]
    IrregularInBinary,

    /// A datatype token was not recognized.
    #[error("unsupported datatype {0:?} (expected \"f4\" or \"f8\")")]
    UnsupportedDtype(String),

    /// The channel's queue peer has gone away.
    #[error("channel {0} queue closed")]
    ChannelClosed(usize),

    /// The metadata preamble could not be serialized or parsed.
    #[error("preamble encoding error: {0}")]
    Preamble(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
