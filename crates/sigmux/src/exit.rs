use std::fmt;
use std::io;

use sigmux_language::LanguageError;
use sigmux_stream::StreamError;
use sigmux_transport::TransportError;

// Exit codes, sysexits-flavored where one fits.
pub const SUCCESS: i32 = 0;
#[allow(dead_code)]
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const RESOURCE_ERROR: i32 = 65;
pub const RATE_MISMATCH: i32 = 70;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => USAGE,
        io::ErrorKind::PermissionDenied => RESOURCE_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn language_error(context: &str, err: LanguageError) -> CliError {
    CliError::new(USAGE, format!("{context}: {err}"))
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    let code = match &err {
        StreamError::Language(_) => USAGE,
        StreamError::RateRequired { .. } => USAGE,
        StreamError::Resource(_) => RESOURCE_ERROR,
        StreamError::RateMismatch { .. } => RATE_MISMATCH,
        StreamError::Transport(TransportError::Interrupted) | StreamError::Interrupted => {
            INTERRUPTED
        }
        StreamError::Transport(_) => TRANSPORT_ERROR,
        StreamError::Frame(_) => DATA_INVALID,
        StreamError::WorkerPanic { .. } => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use sigmux_stream::Rate;

    use super::*;

    #[test]
    fn rate_mismatch_maps_to_its_own_code() {
        let err = stream_error(
            "pipeline failed",
            StreamError::RateMismatch {
                locked: Rate::Hz(100.0),
                offered: Rate::Hz(200.0),
            },
        );
        assert_eq!(err.code, RATE_MISMATCH);
        assert!(err.message.contains("100"));
    }

    #[test]
    fn syntax_errors_map_to_usage() {
        let err = language_error(
            "parse failed",
            LanguageError::Syntax {
                offset: 0,
                expected: "`stream` or `recording`",
                fragment: "bogus".to_string(),
            },
        );
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn interrupt_maps_to_signal_convention() {
        let err = stream_error("pipeline failed", StreamError::Interrupted);
        assert_eq!(err.code, INTERRUPTED);
    }
}
