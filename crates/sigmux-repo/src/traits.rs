use sigmux_frame::Dtype;

use crate::error::Result;
use crate::model::{ReadOptions, RecordingInfo, RecordingOptions, SampleBatch, SignalOptions};

/// A readable signal bound to one channel for the lifetime of a pipe
/// session.
pub trait SignalSource: Send {
    fn uri(&self) -> &str;

    /// Pull the next timed batch, bounded by the `max_points` the source
    /// was opened with. `Ok(None)` when the signal is exhausted.
    fn next_batch(&mut self) -> Result<Option<SampleBatch>>;
}

/// A writable signal created inside a new recording.
pub trait SignalSink: Send {
    fn uri(&self) -> &str;

    /// Append a run of samples encoded at the given width.
    fn append(&mut self, values: &[f64], dtype: Dtype) -> Result<()>;
}

/// Handle onto a recording being written.
pub trait RecordingStore: Send {
    fn uri(&self) -> &str;

    /// Create a sink signal owned by this recording.
    fn new_signal(
        &mut self,
        uri: &str,
        units: Option<&str>,
        options: &SignalOptions,
    ) -> Result<Box<dyn SignalSink>>;

    /// Persist the recording's serialized metadata graph.
    fn save_metadata(&mut self, turtle: &str) -> Result<()>;

    /// Record the total duration and close the recording.
    fn finalize(&mut self, duration: f64) -> Result<()>;
}

/// The signal-repository collaborator consumed by the streaming core.
pub trait Repository: Send + Sync {
    /// Resolve a recording URI to its signal list.
    fn resolve_recording(&self, uri: &str) -> Result<RecordingInfo>;

    /// Open one signal for reading under the given options.
    fn open_signal(&self, uri: &str, options: ReadOptions) -> Result<Box<dyn SignalSource>>;

    /// Create a new recording for writing.
    fn create_recording(
        &self,
        uri: &str,
        options: &RecordingOptions,
    ) -> Result<Box<dyn RecordingStore>>;

    /// Whether `uri` already names a recording or signal here.
    fn contains(&self, uri: &str) -> bool;
}
