//! Streaming sessions and the pipeline orchestrator.
//!
//! One output session per `stream` definition (channel readers feeding
//! a frame multiplexer draining into a write-mode pipe), one input
//! session per `recording` definition (frame reassembly feeding batched
//! sink writes), a first-writer-wins rate lock shared across each
//! session's channels, and a counted start gate that holds every output
//! session until all of them are ready to emit.

pub mod error;
pub mod gate;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod rate;
pub mod reader;
pub mod worker;

pub use error::{Result, StreamError};
pub use gate::StartGate;
pub use input::{InputConfig, InputStream};
pub use output::{BoundSignal, OutputConfig, OutputStream};
pub use pipeline::{MetadataPolicy, Pipeline, PipelineOptions, BUFFER_SIZE};
pub use rate::{Rate, RateLock};
pub use worker::Phase;
