use serde::Serialize;

use crate::error::{LanguageError, Result};

/// Recognized option names. Anything else is preserved untouched and
/// passed through to collaborators.
pub mod keys {
    pub const RATE: &str = "rate";
    pub const UNITS: &str = "units";
    pub const LABEL: &str = "label";
    pub const DESCRIPTION: &str = "description";
    pub const DESC: &str = "desc";
    pub const SEGMENT: &str = "segment";
    pub const STREAM_META: &str = "stream_meta";
    pub const BINARY: &str = "binary";
    pub const DTYPE: &str = "dtype";
}

/// A temporal slice of a recording: start offset and optional duration,
/// both in seconds. A missing duration means "until the recording ends".
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Segment {
    pub start: f64,
    pub duration: Option<f64>,
}

/// Parse segment shorthand: `start-end` or `start:duration`.
///
/// A missing start means the beginning of the recording; a missing end
/// or duration means its end.
pub fn parse_segment(text: &str) -> Result<Segment> {
    if let Some((start, duration)) = text.split_once(':') {
        let start = parse_time(text, start)?.unwrap_or(0.0);
        let duration = parse_time(text, duration)?;
        return Ok(Segment { start, duration });
    }
    if let Some((start, end)) = text.split_once('-') {
        let start = parse_time(text, start)?.unwrap_or(0.0);
        let duration = match parse_time(text, end)? {
            Some(end) if end < start => {
                return Err(LanguageError::Segment {
                    text: text.to_string(),
                    reason: "duration can't be negative",
                });
            }
            Some(end) => Some(end - start),
            None => None,
        };
        return Ok(Segment { start, duration });
    }
    Err(LanguageError::Segment {
        text: text.to_string(),
        reason: "expected `start-end` or `start:duration`",
    })
}

fn parse_time(segment: &str, field: &str) -> Result<Option<f64>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse::<f64>()
        .map(Some)
        .map_err(|_| LanguageError::Segment {
            text: segment.to_string(),
            reason: "times must be numbers of seconds",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_end_form() {
        let segment = parse_segment("10-25").expect("segment should parse");
        assert_eq!(segment.start, 10.0);
        assert_eq!(segment.duration, Some(15.0));
    }

    #[test]
    fn start_duration_form() {
        let segment = parse_segment("10:5").expect("segment should parse");
        assert_eq!(segment.start, 10.0);
        assert_eq!(segment.duration, Some(5.0));
    }

    #[test]
    fn open_ends() {
        assert_eq!(
            parse_segment("-20").expect("segment should parse"),
            Segment {
                start: 0.0,
                duration: Some(20.0)
            }
        );
        assert_eq!(
            parse_segment("10-").expect("segment should parse"),
            Segment {
                start: 10.0,
                duration: None
            }
        );
        assert_eq!(
            parse_segment(":7.5").expect("segment should parse"),
            Segment {
                start: 0.0,
                duration: Some(7.5)
            }
        );
    }

    #[test]
    fn negative_duration_rejected() {
        let err = parse_segment("20-10").expect_err("backwards range should fail");
        assert!(matches!(err, LanguageError::Segment { .. }));
    }

    #[test]
    fn malformed_segment_rejected() {
        assert!(parse_segment("whenever").is_err());
        assert!(parse_segment("a-b").is_err());
    }
}
