/// Errors raised while parsing a connection definition text.
#[derive(Debug, thiserror::Error)]
pub enum LanguageError {
    /// The text deviates from the grammar; reports the offending
    /// fragment.
    #[error("syntax error at byte {offset}: expected {expected} near {fragment:?}")]
    Syntax {
        offset: usize,
        expected: &'static str,
        fragment: String,
    },

    /// A quoted string, URI, or metadata block is not closed.
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },

    /// A segment option value is malformed.
    #[error("invalid segment {text:?}: {reason}")]
    Segment { text: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, LanguageError>;
