use sigmux_frame::Dtype;

/// One pull of timed samples from a signal source.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleBatch {
    /// A run of uniformly sampled values at a fixed rate.
    Uniform { rate: f64, values: Vec<f64> },
    /// Irregularly timed samples as explicit (time, value) points.
    Points(Vec<(f64, f64)>),
}

impl SampleBatch {
    pub fn is_uniform(&self) -> bool {
        matches!(self, SampleBatch::Uniform { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBatch::Uniform { values, .. } => values.len(),
            SampleBatch::Points(points) => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Options for opening a signal for reading.
///
/// No resampling happens anywhere in the pipeline: `rate` and `units`
/// are requests the repository either honors or ignores; the rate
/// checker enforces cross-channel consistency downstream.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub rate: Option<f64>,
    pub units: Option<String>,
    pub dtype: Option<Dtype>,
    /// Temporal slice: start offset in seconds, optional duration.
    pub segment: Option<(f64, Option<f64>)>,
    /// Prefetch bound: maximum samples per returned batch.
    pub max_points: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            rate: None,
            units: None,
            dtype: None,
            segment: None,
            max_points: 10_000,
        }
    }
}

/// Options for creating a sink signal in a new recording.
#[derive(Clone, Debug, Default)]
pub struct SignalOptions {
    pub rate: Option<f64>,
    pub dtype: Option<Dtype>,
    pub label: Option<String>,
    pub description: Option<String>,
}

/// Options for creating a new recording.
#[derive(Clone, Debug, Default)]
pub struct RecordingOptions {
    pub label: Option<String>,
    pub description: Option<String>,
}

/// A resolved signal: identity plus nominal properties.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalInfo {
    pub uri: String,
    /// Nominal sampling rate; `None` for non-uniform signals.
    pub rate: Option<f64>,
    pub units: Option<String>,
}

/// A resolved recording and its signals, in stored order.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingInfo {
    pub uri: String,
    pub signals: Vec<SignalInfo>,
}
