//! The sigmux connection definition language.
//!
//! A definition text is a sequence of `stream` and `recording` clauses.
//! A `stream` clause binds a source recording and a pipe, an option
//! list, and a parenthesized list of signal clauses; a `recording`
//! clause additionally carries an optional trailing metadata fragment in
//! braces, captured verbatim:
//!
//! ```text
//! stream <http://example.org/rec1> "/tmp/p1" rate=100 (
//!     sig:<http://example.org/rec1/ecg> units=mV
//!     sig:<http://example.org/rec1/resp>
//! )
//! recording <http://example.org/rec2> "/tmp/p1" rate=100 (
//!     sig:<ecg> sig:<resp>
//! ) {
//!     <> dct:title "copied recording" .
//! }
//! ```
//!
//! Parsing is pure: no I/O, no process creation. Unknown option keys are
//! preserved untouched for forward compatibility.

pub mod def;
pub mod error;
pub mod options;
pub mod parser;

pub use def::{Definition, OptionMap, RecordingDef, SignalRef, StreamDef, Value};
pub use error::{LanguageError, Result};
pub use options::{keys, parse_segment, Segment};
pub use parser::parse;
