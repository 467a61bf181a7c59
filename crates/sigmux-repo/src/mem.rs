use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sigmux_frame::Dtype;
use tracing::debug;

use crate::error::{RepoError, Result};
use crate::model::{
    ReadOptions, RecordingInfo, RecordingOptions, SampleBatch, SignalInfo, SignalOptions,
};
use crate::traits::{RecordingStore, Repository, SignalSink, SignalSource};

/// In-memory repository backend.
///
/// A cheap shared handle; clones address the same store. Serves as the
/// test double for the external signal-repository collaborator and as a
/// scriptable backend for simulated pipelines.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    store: Arc<Mutex<Store>>,
}

#[derive(Default)]
struct Store {
    recordings: HashMap<String, StoredRecording>,
    signals: HashMap<String, StoredSignal>,
}

#[derive(Default)]
struct StoredRecording {
    label: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    metadata: Option<String>,
    signals: Vec<String>,
}

struct StoredSignal {
    units: Option<String>,
    rate: Option<f64>,
    data: SignalData,
}

#[derive(Clone)]
enum SignalData {
    Uniform(Vec<f64>),
    Points(Vec<(f64, f64)>),
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed an empty recording.
    pub fn add_recording(&self, uri: &str) {
        self.lock()
            .recordings
            .entry(uri.to_string())
            .or_default();
    }

    /// Seed a uniformly sampled signal under a recording.
    pub fn add_uniform_signal(
        &self,
        recording: &str,
        uri: &str,
        units: Option<&str>,
        rate: f64,
        values: Vec<f64>,
    ) {
        let mut store = self.lock();
        store
            .recordings
            .entry(recording.to_string())
            .or_default()
            .signals
            .push(uri.to_string());
        store.signals.insert(
            uri.to_string(),
            StoredSignal {
                units: units.map(str::to_string),
                rate: Some(rate),
                data: SignalData::Uniform(values),
            },
        );
    }

    /// Seed an irregularly timed signal under a recording.
    pub fn add_point_signal(
        &self,
        recording: &str,
        uri: &str,
        units: Option<&str>,
        points: Vec<(f64, f64)>,
    ) {
        let mut store = self.lock();
        store
            .recordings
            .entry(recording.to_string())
            .or_default()
            .signals
            .push(uri.to_string());
        store.signals.insert(
            uri.to_string(),
            StoredSignal {
                units: units.map(str::to_string),
                rate: None,
                data: SignalData::Points(points),
            },
        );
    }

    /// Stored sample values of a uniform signal, for assertions.
    pub fn signal_values(&self, uri: &str) -> Option<Vec<f64>> {
        match self.lock().signals.get(uri).map(|s| s.data.clone()) {
            Some(SignalData::Uniform(values)) => Some(values),
            _ => None,
        }
    }

    /// Stored metadata of a recording, for assertions.
    pub fn recording_metadata(&self, uri: &str) -> Option<String> {
        self.lock()
            .recordings
            .get(uri)
            .and_then(|r| r.metadata.clone())
    }

    /// Finalized duration of a recording, for assertions.
    pub fn recording_duration(&self, uri: &str) -> Option<f64> {
        self.lock().recordings.get(uri).and_then(|r| r.duration)
    }
}

impl Repository for MemoryRepository {
    fn resolve_recording(&self, uri: &str) -> Result<RecordingInfo> {
        let store = self.lock();
        let recording = store
            .recordings
            .get(uri)
            .ok_or_else(|| RepoError::NotFound(uri.to_string()))?;
        let signals = recording
            .signals
            .iter()
            .filter_map(|sig_uri| {
                store.signals.get(sig_uri).map(|signal| SignalInfo {
                    uri: sig_uri.clone(),
                    rate: signal.rate,
                    units: signal.units.clone(),
                })
            })
            .collect();
        Ok(RecordingInfo {
            uri: uri.to_string(),
            signals,
        })
    }

    fn open_signal(&self, uri: &str, options: ReadOptions) -> Result<Box<dyn SignalSource>> {
        let store = self.lock();
        let signal = store
            .signals
            .get(uri)
            .ok_or_else(|| RepoError::NotFound(uri.to_string()))?;
        let data = slice_segment(&signal.data, signal.rate, options.segment);
        debug!(uri, max_points = options.max_points, "opened memory signal");
        Ok(Box::new(MemorySource {
            uri: uri.to_string(),
            rate: signal.rate,
            max_points: options.max_points.max(1),
            cursor: 0,
            data,
        }))
    }

    fn create_recording(
        &self,
        uri: &str,
        options: &RecordingOptions,
    ) -> Result<Box<dyn RecordingStore>> {
        let mut store = self.lock();
        if store.recordings.contains_key(uri) {
            return Err(RepoError::AlreadyExists(uri.to_string()));
        }
        store.recordings.insert(
            uri.to_string(),
            StoredRecording {
                label: options.label.clone(),
                description: options.description.clone(),
                ..StoredRecording::default()
            },
        );
        debug!(uri, "created memory recording");
        Ok(Box::new(MemoryStore {
            repo: self.clone(),
            uri: uri.to_string(),
            closed: false,
        }))
    }

    fn contains(&self, uri: &str) -> bool {
        let store = self.lock();
        store.recordings.contains_key(uri) || store.signals.contains_key(uri)
    }
}

/// Restrict stored data to the requested temporal slice.
fn slice_segment(
    data: &SignalData,
    rate: Option<f64>,
    segment: Option<(f64, Option<f64>)>,
) -> SignalData {
    let Some((start, duration)) = segment else {
        return data.clone();
    };
    match data {
        SignalData::Uniform(values) => {
            let rate = rate.unwrap_or(1.0);
            let first = (start * rate).floor() as usize;
            let first = first.min(values.len());
            let count = duration
                .map(|d| ((d * rate).round() as usize).min(values.len() - first))
                .unwrap_or(values.len() - first);
            SignalData::Uniform(values[first..first + count].to_vec())
        }
        SignalData::Points(points) => {
            let end = duration.map(|d| start + d);
            SignalData::Points(
                points
                    .iter()
                    .filter(|(t, _)| *t >= start && end.map(|e| *t < e).unwrap_or(true))
                    .copied()
                    .collect(),
            )
        }
    }
}

struct MemorySource {
    uri: String,
    rate: Option<f64>,
    max_points: usize,
    cursor: usize,
    data: SignalData,
}

impl SignalSource for MemorySource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn next_batch(&mut self) -> Result<Option<SampleBatch>> {
        match &self.data {
            SignalData::Uniform(values) => {
                if self.cursor >= values.len() {
                    return Ok(None);
                }
                let end = values.len().min(self.cursor + self.max_points);
                let batch = values[self.cursor..end].to_vec();
                self.cursor = end;
                Ok(Some(SampleBatch::Uniform {
                    rate: self.rate.unwrap_or(1.0),
                    values: batch,
                }))
            }
            SignalData::Points(points) => {
                if self.cursor >= points.len() {
                    return Ok(None);
                }
                let end = points.len().min(self.cursor + self.max_points);
                let batch = points[self.cursor..end].to_vec();
                self.cursor = end;
                Ok(Some(SampleBatch::Points(batch)))
            }
        }
    }
}

struct MemoryStore {
    repo: MemoryRepository,
    uri: String,
    closed: bool,
}

impl RecordingStore for MemoryStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn new_signal(
        &mut self,
        uri: &str,
        units: Option<&str>,
        options: &SignalOptions,
    ) -> Result<Box<dyn SignalSink>> {
        if self.closed {
            return Err(RepoError::Closed);
        }
        let mut store = self.repo.lock();
        if store.signals.contains_key(uri) {
            return Err(RepoError::AlreadyExists(uri.to_string()));
        }
        store.signals.insert(
            uri.to_string(),
            StoredSignal {
                units: units.map(str::to_string),
                rate: options.rate,
                data: SignalData::Uniform(Vec::new()),
            },
        );
        let recording = store
            .recordings
            .get_mut(&self.uri)
            .ok_or_else(|| RepoError::NotFound(self.uri.clone()))?;
        recording.signals.push(uri.to_string());
        Ok(Box::new(MemorySink {
            repo: self.repo.clone(),
            uri: uri.to_string(),
        }))
    }

    fn save_metadata(&mut self, turtle: &str) -> Result<()> {
        if self.closed {
            return Err(RepoError::Closed);
        }
        let mut store = self.repo.lock();
        let recording = store
            .recordings
            .get_mut(&self.uri)
            .ok_or_else(|| RepoError::NotFound(self.uri.clone()))?;
        recording.metadata = Some(turtle.to_string());
        Ok(())
    }

    fn finalize(&mut self, duration: f64) -> Result<()> {
        if self.closed {
            return Err(RepoError::Closed);
        }
        let mut store = self.repo.lock();
        let recording = store
            .recordings
            .get_mut(&self.uri)
            .ok_or_else(|| RepoError::NotFound(self.uri.clone()))?;
        recording.duration = Some(duration);
        self.closed = true;
        debug!(uri = %self.uri, duration, "finalized memory recording");
        Ok(())
    }
}

struct MemorySink {
    repo: MemoryRepository,
    uri: String,
}

impl SignalSink for MemorySink {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn append(&mut self, values: &[f64], dtype: Dtype) -> Result<()> {
        let mut store = self.repo.lock();
        let signal = store
            .signals
            .get_mut(&self.uri)
            .ok_or_else(|| RepoError::NotFound(self.uri.clone()))?;
        let SignalData::Uniform(stored) = &mut signal.data else {
            return Err(RepoError::NotFound(self.uri.clone()));
        };
        match dtype {
            // Round through the narrower width the way the wire would.
            Dtype::F4 => stored.extend(values.iter().map(|v| *v as f32 as f64)),
            Dtype::F8 => stored.extend_from_slice(values),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_signals_read_back_in_batches() {
        let repo = MemoryRepository::new();
        repo.add_uniform_signal("rec", "rec/sig", Some("mV"), 100.0, (0..25).map(f64::from).collect());

        let mut source = repo
            .open_signal(
                "rec/sig",
                ReadOptions {
                    max_points: 10,
                    ..ReadOptions::default()
                },
            )
            .expect("signal should open");

        let mut sizes = Vec::new();
        while let Some(batch) = source.next_batch().expect("batch should read") {
            assert!(batch.is_uniform());
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn segment_slices_uniform_data() {
        let repo = MemoryRepository::new();
        repo.add_uniform_signal("rec", "rec/sig", None, 10.0, (0..100).map(f64::from).collect());

        let mut source = repo
            .open_signal(
                "rec/sig",
                ReadOptions {
                    segment: Some((2.0, Some(1.0))),
                    ..ReadOptions::default()
                },
            )
            .expect("signal should open");

        let batch = source
            .next_batch()
            .expect("batch should read")
            .expect("segment should be nonempty");
        let SampleBatch::Uniform { values, .. } = batch else {
            panic!("expected uniform data");
        };
        assert_eq!(values.len(), 10);
        assert_eq!(values[0], 20.0);
    }

    #[test]
    fn point_signals_read_back_as_points() {
        let repo = MemoryRepository::new();
        repo.add_point_signal("rec", "rec/ann", None, vec![(0.5, 1.0), (2.5, 2.0)]);

        let mut source = repo
            .open_signal("rec/ann", ReadOptions::default())
            .expect("signal should open");
        let batch = source
            .next_batch()
            .expect("batch should read")
            .expect("points should be present");
        assert!(!batch.is_uniform());
    }

    #[test]
    fn recording_round_trip_through_store() {
        let repo = MemoryRepository::new();
        let mut store = repo
            .create_recording("rec2", &RecordingOptions::default())
            .expect("recording should be created");
        store
            .save_metadata("@prefix dct: <http://purl.org/dc/terms/> .")
            .expect("metadata should save");
        let mut sink = store
            .new_signal("rec2/out", Some("mV"), &SignalOptions::default())
            .expect("signal should be created");
        sink.append(&[1.0, 2.0, 3.0], Dtype::F8)
            .expect("append should succeed");
        store.finalize(0.03).expect("finalize should succeed");

        assert_eq!(repo.signal_values("rec2/out"), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(repo.recording_duration("rec2"), Some(0.03));
        assert!(repo
            .recording_metadata("rec2")
            .expect("metadata should exist")
            .contains("dct"));
        assert!(repo.contains("rec2"));
        assert!(repo.contains("rec2/out"));
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let repo = MemoryRepository::new();
        repo.add_recording("rec");
        assert!(matches!(
            repo.create_recording("rec", &RecordingOptions::default()),
            Err(RepoError::AlreadyExists(_))
        ));

        let mut store = repo
            .create_recording("rec2", &RecordingOptions::default())
            .expect("recording should be created");
        repo.add_uniform_signal("rec", "rec/sig", None, 10.0, vec![]);
        assert!(matches!(
            store.new_signal("rec/sig", None, &SignalOptions::default()),
            Err(RepoError::AlreadyExists(_))
        ));
    }

    #[test]
    fn finalized_store_rejects_further_writes() {
        let repo = MemoryRepository::new();
        let mut store = repo
            .create_recording("rec3", &RecordingOptions::default())
            .expect("recording should be created");
        store.finalize(1.0).expect("finalize should succeed");
        assert!(matches!(
            store.save_metadata("x"),
            Err(RepoError::Closed)
        ));
    }

    #[test]
    fn f4_appends_round_through_single_precision() {
        let repo = MemoryRepository::new();
        let mut store = repo
            .create_recording("rec4", &RecordingOptions::default())
            .expect("recording should be created");
        let mut sink = store
            .new_signal("rec4/s", None, &SignalOptions::default())
            .expect("signal should be created");
        sink.append(&[0.1], Dtype::F4).expect("append should succeed");
        let stored = repo.signal_values("rec4/s").expect("values should exist");
        assert_eq!(stored[0], 0.1f32 as f64);
    }
}
