use sigmux_frame::FrameError;
use sigmux_language::LanguageError;
use sigmux_repo::RepoError;
use sigmux_transport::TransportError;

use crate::rate::Rate;

/// Errors raised while constructing or running streaming sessions.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Channels bound to one multiplexer session disagree on rate.
    /// Fatal to the whole pipeline, not just the offending channel.
    #[error("signal rates don't match: {locked} locked, {offered} offered")]
    RateMismatch { locked: Rate, offered: Rate },

    /// A recording definition carries no `rate` option; the receiving
    /// side cannot derive durations without one.
    #[error("input stream for <{uri}> needs an explicit rate")]
    RateRequired { uri: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Resource(#[from] RepoError),

    #[error(transparent)]
    Language(#[from] LanguageError),

    /// The session was cancelled via the shared interrupt flag.
    #[error("interrupted")]
    Interrupted,

    #[error("{worker} worker panicked")]
    WorkerPanic { worker: String },
}

impl StreamError {
    /// Whether this error only reports cancellation, carrying no fault
    /// of its own.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            StreamError::Interrupted | StreamError::Transport(TransportError::Interrupted)
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
