//! Interfaces to the signal-repository collaborator.
//!
//! The streaming core talks to signal storage only through the narrow
//! traits defined here: resolve a recording, open its signals for
//! reading, create new recordings and sink signals for writing. Two
//! backends are provided: an in-memory store used by tests and
//! simulated pipelines, and a directory-backed store for running
//! against local data. Units shorthand resolution and the recording
//! metadata graph live here too.

pub mod error;
pub mod fs;
pub mod mem;
pub mod metadata;
pub mod model;
pub mod traits;
pub mod units;
pub mod uri;

pub use error::{RepoError, Result};
pub use fs::FsRepository;
pub use mem::MemoryRepository;
pub use metadata::{data_source, Graph, Object, Statement, DCT_SOURCE};
pub use model::{
    ReadOptions, RecordingInfo, RecordingOptions, SampleBatch, SignalInfo, SignalOptions,
};
pub use traits::{RecordingStore, Repository, SignalSink, SignalSource};
