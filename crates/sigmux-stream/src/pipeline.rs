use std::sync::Arc;
use std::thread;

use sigmux_frame::{Dtype, Encoding};
use sigmux_language::{
    keys, parse_segment, Definition, OptionMap, RecordingDef, StreamDef, Value,
};
use sigmux_repo::{
    data_source, units, uri, Graph, ReadOptions, RecordingOptions, RepoError, Repository,
    SignalOptions,
};
use sigmux_transport::{create_fifo, Interrupt};
use tracing::{debug, error, info};

use crate::error::{Result, StreamError};
use crate::gate::StartGate;
use crate::input::{InputConfig, InputStream};
use crate::output::{BoundSignal, OutputConfig, OutputStream};
use crate::worker::collect_worker;

/// Shared per-channel prefetch and sink batch bound.
pub const BUFFER_SIZE: usize = 10_000;

/// How additional metadata is generated for new recordings. Metadata
/// supplied in the definition itself is always used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetadataPolicy {
    /// Attach provenance links to every source only when the definition
    /// supplies no metadata fragment.
    #[default]
    Auto,
    /// Never generate additional metadata.
    None,
    /// Always attach provenance links, regardless of supplied metadata.
    All,
}

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub metadata: MetadataPolicy,
    /// When false, parse and construct everything but move no data.
    pub stream_data: bool,
    pub buffer_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            metadata: MetadataPolicy::Auto,
            stream_data: true,
            buffer_size: BUFFER_SIZE,
        }
    }
}

/// Top-level driver: parses definitions, prepares pipes and metadata,
/// and runs every stream and recording session to completion.
pub struct Pipeline {
    repo: Arc<dyn Repository>,
    options: PipelineOptions,
    interrupt: Interrupt,
}

impl Pipeline {
    pub fn new(repo: Arc<dyn Repository>, options: PipelineOptions) -> Self {
        Self {
            repo,
            options,
            interrupt: Interrupt::new(),
        }
    }

    /// The pipeline's interrupt flag, for wiring to signal handlers and
    /// for tests to cancel a run.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Parse `definitions` and run the described pipeline to
    /// completion.
    ///
    /// Construction is all-or-nothing: any resolution or pipe fault
    /// aborts before a single worker starts. Input workers start before
    /// output workers so consumers exist by the time producers block on
    /// pipe open.
    pub fn run(&self, definitions: &str) -> Result<()> {
        let definitions = sigmux_language::parse(definitions)?;
        let gate = StartGate::new();

        let mut outputs = Vec::new();
        let mut sources = Vec::new();
        for def in &definitions {
            if let Definition::Stream(def) = def {
                let (stream, graph) = self
                    .build_output(def, &gate)
                    .map_err(|err| self.abort(err))?;
                gate.register();
                outputs.push((def.pipe.clone(), stream));
                sources.push(graph);
            }
        }

        let mut inputs = Vec::new();
        let mut recordings = 0usize;
        for def in &definitions {
            if let Definition::Recording(def) = def {
                recordings += 1;
                if self.options.stream_data {
                    let input = self
                        .build_input(def, &sources)
                        .map_err(|err| self.abort(err))?;
                    inputs.push((def.pipe.clone(), input));
                } else {
                    // Dry run: validate without creating repository state.
                    self.check_input(def).map_err(|err| self.abort(err))?;
                }
            }
        }

        if !self.options.stream_data {
            info!(
                streams = outputs.len(),
                recordings,
                "definitions validated; not streaming"
            );
            return Ok(());
        }

        let mut workers = Vec::new();
        for (pipe, input) in inputs {
            workers.push((format!("input:{pipe}"), thread::spawn(move || input.run())));
        }
        for (pipe, output) in outputs {
            workers.push((format!("output:{pipe}"), thread::spawn(move || output.run())));
        }

        let mut fault: Option<StreamError> = None;
        let mut interrupted = false;
        for (name, handle) in workers {
            match collect_worker(&name, handle, &self.interrupt) {
                Some(Ok(())) | None => {}
                Some(Err(err)) if err.is_interrupt() => interrupted = true,
                Some(Err(err)) => {
                    error!(worker = %name, %err, "worker failed");
                    // Escalate so sibling pipes unwind too.
                    self.interrupt.set();
                    fault.get_or_insert(err);
                }
            }
        }
        if let Some(fault) = fault {
            return Err(fault);
        }
        if interrupted {
            return Err(StreamError::Interrupted);
        }
        Ok(())
    }

    fn abort(&self, err: StreamError) -> StreamError {
        self.interrupt.set();
        err
    }

    /// Resolve a `stream` definition into an output session plus the
    /// data-source graph later recordings may link to.
    fn build_output(&self, def: &StreamDef, gate: &StartGate) -> Result<(OutputStream, Graph)> {
        let recording = self.repo.resolve_recording(&def.recording)?;
        debug!(uri = %recording.uri, signals = recording.signals.len(), "resolved source recording");
        let pipe = create_fifo(&def.pipe)?;

        let rate = def.options.number(keys::RATE);
        let segment = match def.options.text(keys::SEGMENT) {
            Some(text) => {
                let segment = parse_segment(text)?;
                Some((segment.start, segment.duration))
            }
            None => None,
        };
        let encoding = encoding_of(&def.options)?;
        let default_units = resolve_units(def.options.get(keys::UNITS))?;
        let default_dtype = dtype_of(&def.options)?;

        let base = format!("{}/", def.recording);
        let mut signals = Vec::with_capacity(def.signals.len());
        for sig in &def.signals {
            let sig_uri = uri::resolve(&base, &sig.uri);
            let sig_units =
                resolve_units(sig.options.get(keys::UNITS))?.or_else(|| default_units.clone());
            let dtype = dtype_of(&sig.options)?.or(default_dtype).unwrap_or_default();
            let source = self.repo.open_signal(
                &sig_uri,
                ReadOptions {
                    rate,
                    units: sig_units.clone(),
                    dtype: Some(dtype),
                    segment,
                    max_points: self.options.buffer_size,
                },
            )?;
            signals.push(BoundSignal {
                source,
                units: sig_units,
                dtype,
            });
        }

        let graph = data_source(&def.recording, segment);
        let config = OutputConfig {
            pipe,
            encoding,
            stream_meta: def.options.flag(keys::STREAM_META),
            rate,
            queue_depth: self.options.buffer_size,
        };
        let stream = OutputStream::new(signals, config, gate.clone(), self.interrupt.clone());
        Ok((stream, graph))
    }

    /// Dry-run validation of a `recording` definition: pipe path,
    /// options, and resource availability, with no repository writes.
    fn check_input(&self, def: &RecordingDef) -> Result<()> {
        create_fifo(&def.pipe)?;
        def.options
            .number(keys::RATE)
            .ok_or_else(|| StreamError::RateRequired {
                uri: def.recording.clone(),
            })?;
        encoding_of(&def.options)?;
        resolve_units(def.options.get(keys::UNITS))?;
        if self.repo.contains(&def.recording) {
            return Err(RepoError::AlreadyExists(def.recording.clone()).into());
        }
        let base = format!("{}/", def.recording);
        for sig in &def.signals {
            let sig_uri = uri::resolve(&base, &sig.uri);
            if self.repo.contains(&sig_uri) {
                return Err(RepoError::AlreadyExists(sig_uri).into());
            }
            resolve_units(sig.options.get(keys::UNITS))?;
            dtype_of(&sig.options)?;
        }
        Ok(())
    }

    /// Resolve a `recording` definition into an input session, creating
    /// the recording, its metadata, and its sink signals up front.
    fn build_input(&self, def: &RecordingDef, sources: &[Graph]) -> Result<InputStream> {
        let pipe = create_fifo(&def.pipe)?;
        let rate = def
            .options
            .number(keys::RATE)
            .ok_or_else(|| StreamError::RateRequired {
                uri: def.recording.clone(),
            })?;
        let encoding = encoding_of(&def.options)?;
        let default_units = resolve_units(def.options.get(keys::UNITS))?;
        let default_dtype = dtype_of(&def.options)?;
        let base = format!("{}/", def.recording);

        let metadata = self.build_metadata(def, &base, sources);

        let mut store = self.repo.create_recording(
            &def.recording,
            &RecordingOptions {
                label: def.options.text(keys::LABEL).map(str::to_string),
                description: description_of(&def.options),
            },
        )?;
        if let Some(graph) = &metadata {
            store.save_metadata(&graph.serialize())?;
        }
        debug!(uri = %def.recording, "created destination recording");

        let mut sinks = Vec::with_capacity(def.signals.len());
        let mut dtypes = Vec::with_capacity(def.signals.len());
        for sig in &def.signals {
            let sig_uri = uri::resolve(&base, &sig.uri);
            if self.repo.contains(&sig_uri) {
                return Err(RepoError::AlreadyExists(sig_uri).into());
            }
            let sig_units =
                resolve_units(sig.options.get(keys::UNITS))?.or_else(|| default_units.clone());
            let dtype = dtype_of(&sig.options)?.or(default_dtype).unwrap_or_default();
            let sink = store.new_signal(
                &sig_uri,
                sig_units.as_deref(),
                &SignalOptions {
                    rate: Some(rate),
                    dtype: Some(dtype),
                    label: sig.options.text(keys::LABEL).map(str::to_string),
                    description: description_of(&sig.options),
                },
            )?;
            sinks.push(sink);
            dtypes.push(dtype);
        }

        Ok(InputStream::new(
            store,
            sinks,
            InputConfig {
                pipe,
                encoding,
                rate,
                batch: self.options.buffer_size,
                dtypes,
            },
            self.interrupt.clone(),
        ))
    }

    /// Build or merge the new recording's metadata under the configured
    /// policy.
    fn build_metadata(&self, def: &RecordingDef, base: &str, sources: &[Graph]) -> Option<Graph> {
        let fragment = def.metadata.as_deref().map(str::trim).unwrap_or("");
        if self.options.metadata == MetadataPolicy::None && fragment.is_empty() {
            return None;
        }
        let mut graph = Graph::new(def.recording.as_str()).with_base(base);
        let attach_sources = match self.options.metadata {
            MetadataPolicy::All => true,
            MetadataPolicy::Auto => fragment.is_empty(),
            MetadataPolicy::None => false,
        };
        if attach_sources {
            for source in sources {
                graph.add_source(&def.recording, source.uri());
                graph.extend_from(source);
            }
        }
        if !fragment.is_empty() {
            graph.merge_fragment(fragment);
        }
        Some(graph)
    }
}

fn encoding_of(options: &OptionMap) -> Result<Encoding> {
    if options.flag(keys::BINARY) {
        Ok(Encoding::Binary(dtype_of(options)?.unwrap_or_default()))
    } else {
        Ok(Encoding::Text)
    }
}

fn dtype_of(options: &OptionMap) -> Result<Option<Dtype>> {
    match options.text(keys::DTYPE) {
        Some(token) => Ok(Some(Dtype::parse(token)?)),
        None => Ok(None),
    }
}

fn resolve_units(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(Value::Uri(uri)) => Ok(Some(uri.clone())),
        Some(value) => match value.as_text() {
            Some(token) => Ok(Some(units::resolve(token)?)),
            None => Ok(None),
        },
    }
}

fn description_of(options: &OptionMap) -> Option<String> {
    options
        .text(keys::DESCRIPTION)
        .or_else(|| options.text(keys::DESC))
        .map(str::to_string)
}
