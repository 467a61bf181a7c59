use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sigmux_frame::Dtype;
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::model::{
    ReadOptions, RecordingInfo, RecordingOptions, SampleBatch, SignalInfo, SignalOptions,
};
use crate::traits::{RecordingStore, Repository, SignalSink, SignalSource};

const MANIFEST_FILE: &str = "recording.json";

/// Directory-backed repository: one subdirectory per recording holding
/// a JSON manifest plus one raw little-endian sample file per signal.
///
/// Stores uniformly sampled streams only; irregular point data is the
/// in-memory backend's concern.
pub struct FsRepository {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<String>,
    #[serde(default)]
    signals: Vec<ManifestSignal>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ManifestSignal {
    uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rate: Option<f64>,
    #[serde(default)]
    dtype: Dtype,
    file: String,
}

impl FsRepository {
    /// Open (creating if needed) a repository rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| RepoError::Storage {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn recording_dir(&self, uri: &str) -> PathBuf {
        self.root.join(sanitize(uri))
    }

    fn load_manifest(&self, uri: &str) -> Result<(PathBuf, Manifest)> {
        let dir = self.recording_dir(uri);
        let path = dir.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoError::NotFound(uri.to_string())
            } else {
                RepoError::Storage { path: path.clone(), source: e }
            }
        })?;
        let manifest = serde_json::from_str(&text)?;
        Ok((dir, manifest))
    }

    /// Find the recording manifest holding a given signal.
    fn find_signal(&self, uri: &str) -> Result<(PathBuf, ManifestSignal)> {
        let entries = fs::read_dir(&self.root).map_err(|e| RepoError::Storage {
            path: self.root.clone(),
            source: e,
        })?;
        for entry in entries.flatten() {
            let manifest_path = entry.path().join(MANIFEST_FILE);
            let Ok(text) = fs::read_to_string(&manifest_path) else {
                continue;
            };
            let Ok(manifest) = serde_json::from_str::<Manifest>(&text) else {
                continue;
            };
            if let Some(signal) = manifest.signals.iter().find(|s| s.uri == uri) {
                return Ok((entry.path(), signal.clone()));
            }
        }
        Err(RepoError::NotFound(uri.to_string()))
    }
}

fn sanitize(uri: &str) -> String {
    let stripped = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn store_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let text = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, text).map_err(|e| RepoError::Storage { path, source: e })
}

impl Repository for FsRepository {
    fn resolve_recording(&self, uri: &str) -> Result<RecordingInfo> {
        let (_, manifest) = self.load_manifest(uri)?;
        Ok(RecordingInfo {
            uri: manifest.uri,
            signals: manifest
                .signals
                .into_iter()
                .map(|s| SignalInfo {
                    uri: s.uri,
                    rate: s.rate,
                    units: s.units,
                })
                .collect(),
        })
    }

    fn open_signal(&self, uri: &str, options: ReadOptions) -> Result<Box<dyn SignalSource>> {
        let (dir, signal) = self.find_signal(uri)?;
        let path = dir.join(&signal.file);
        let mut file = File::open(&path).map_err(|e| RepoError::Storage {
            path: path.clone(),
            source: e,
        })?;
        let rate = signal.rate.unwrap_or(1.0);
        let width = signal.dtype.width() as u64;

        let mut remaining = None;
        if let Some((start, duration)) = options.segment {
            let skip = (start * rate).floor() as u64;
            file.seek(SeekFrom::Start(skip * width))
                .map_err(|e| RepoError::Storage {
                    path: path.clone(),
                    source: e,
                })?;
            remaining = duration.map(|d| (d * rate).round() as u64);
        }
        debug!(uri, path = %path.display(), "opened file signal");
        Ok(Box::new(FsSource {
            uri: uri.to_string(),
            path,
            file,
            rate,
            dtype: signal.dtype,
            remaining,
            max_points: options.max_points.max(1),
        }))
    }

    fn create_recording(
        &self,
        uri: &str,
        options: &RecordingOptions,
    ) -> Result<Box<dyn RecordingStore>> {
        let dir = self.recording_dir(uri);
        if dir.join(MANIFEST_FILE).exists() {
            return Err(RepoError::AlreadyExists(uri.to_string()));
        }
        fs::create_dir_all(&dir).map_err(|e| RepoError::Storage {
            path: dir.clone(),
            source: e,
        })?;
        let manifest = Manifest {
            uri: uri.to_string(),
            label: options.label.clone(),
            description: options.description.clone(),
            duration: None,
            metadata: None,
            signals: Vec::new(),
        };
        store_manifest(&dir, &manifest)?;
        info!(uri, dir = %dir.display(), "created recording");
        Ok(Box::new(FsStore {
            dir,
            manifest,
            closed: false,
        }))
    }

    fn contains(&self, uri: &str) -> bool {
        self.load_manifest(uri).is_ok() || self.find_signal(uri).is_ok()
    }
}

struct FsSource {
    uri: String,
    path: PathBuf,
    file: File,
    rate: f64,
    dtype: Dtype,
    /// Samples left to deliver when a segment bounds the read.
    remaining: Option<u64>,
    max_points: usize,
}

impl SignalSource for FsSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn next_batch(&mut self) -> Result<Option<SampleBatch>> {
        let take = match self.remaining {
            Some(0) => return Ok(None),
            Some(left) => (left as usize).min(self.max_points),
            None => self.max_points,
        };
        let width = self.dtype.width();
        let mut raw = vec![0u8; take * width];
        let mut filled = 0usize;
        while filled < raw.len() {
            let n = self
                .file
                .read(&mut raw[filled..])
                .map_err(|e| RepoError::Storage {
                    path: self.path.clone(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let samples = filled / width;
        if samples == 0 {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(samples);
        for i in 0..samples {
            let start = i * width;
            let value = match self.dtype {
                Dtype::F4 => {
                    let mut bytes = [0u8; 4];
                    bytes.copy_from_slice(&raw[start..start + 4]);
                    f32::from_le_bytes(bytes) as f64
                }
                Dtype::F8 => {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(&raw[start..start + 8]);
                    f64::from_le_bytes(bytes)
                }
            };
            values.push(value);
        }
        if let Some(left) = &mut self.remaining {
            *left -= samples as u64;
        }
        Ok(Some(SampleBatch::Uniform {
            rate: self.rate,
            values,
        }))
    }
}

struct FsStore {
    dir: PathBuf,
    manifest: Manifest,
    closed: bool,
}

impl RecordingStore for FsStore {
    fn uri(&self) -> &str {
        &self.manifest.uri
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
        if self.manifest.signals.iter().any(|s| s.uri == uri) {
            return Err(RepoError::AlreadyExists(uri.to_string()));
        }
        let dtype = options.dtype.unwrap_or_default();
        let file_name = format!("{}.dat", sanitize(uri));
        self.manifest.signals.push(ManifestSignal {
            uri: uri.to_string(),
            units: units.map(str::to_string),
            rate: options.rate,
            dtype,
            file: file_name.clone(),
        });
        store_manifest(&self.dir, &self.manifest)?;
        let path = self.dir.join(file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RepoError::Storage {
                path: path.clone(),
                source: e,
            })?;
        Ok(Box::new(FsSink {
            uri: uri.to_string(),
            path,
            file,
        }))
    }

    fn save_metadata(&mut self, turtle: &str) -> Result<()> {
        if self.closed {
            return Err(RepoError::Closed);
        }
        self.manifest.metadata = Some(turtle.to_string());
        store_manifest(&self.dir, &self.manifest)
    }

    fn finalize(&mut self, duration: f64) -> Result<()> {
        if self.closed {
            return Err(RepoError::Closed);
        }
        self.manifest.duration = Some(duration);
        self.closed = true;
        store_manifest(&self.dir, &self.manifest)?;
        info!(uri = %self.manifest.uri, duration, "finalized recording");
        Ok(())
    }
}

struct FsSink {
    uri: String,
    path: PathBuf,
    file: File,
}

impl SignalSink for FsSink {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn append(&mut self, values: &[f64], dtype: Dtype) -> Result<()> {
        let mut raw = Vec::with_capacity(values.len() * dtype.width());
        for value in values {
            match dtype {
                Dtype::F4 => raw.extend_from_slice(&(*value as f32).to_le_bytes()),
                Dtype::F8 => raw.extend_from_slice(&value.to_le_bytes()),
            }
        }
        self.file.write_all(&raw).map_err(|e| RepoError::Storage {
            path: self.path.clone(),
            source: e,
        })
    }
}
