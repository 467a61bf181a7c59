use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use sigmux_frame::{Dtype, Encoding, FrameMux, MuxConfig, StreamInfo, DEFAULT_QUEUE_DEPTH};
use sigmux_repo::SignalSource;
use sigmux_transport::{Interrupt, PipeWriter};
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::gate::StartGate;
use crate::rate::{Rate, RateLock};
use crate::reader::run_reader;
use crate::worker::{join_worker, Phase, JOIN_TIMEOUT};

/// One signal bound to a channel slot of an output session.
pub struct BoundSignal {
    pub source: Box<dyn SignalSource>,
    pub units: Option<String>,
    pub dtype: Dtype,
}

/// Configuration of one output stream session.
pub struct OutputConfig {
    pub pipe: PathBuf,
    pub encoding: Encoding,
    /// Emit the self-describing metadata preamble as the first record.
    pub stream_meta: bool,
    /// Rate requested in the definition; pre-locks the rate checker.
    pub rate: Option<f64>,
    pub queue_depth: usize,
}

impl OutputConfig {
    pub fn new(pipe: impl Into<PathBuf>) -> Self {
        Self {
            pipe: pipe.into(),
            encoding: Encoding::Text,
            stream_meta: false,
            rate: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// A write-mode pipe session: one frame multiplexer, one channel reader
/// per bound signal, one pipe endpoint.
///
/// Phases: `Created → PipeOpening` (blocks until a reader attaches) `→
/// BarrierWait → Streaming → Draining → Closed`. Any fault drops the
/// session straight into Draining so readers are stopped and the pipe
/// is closed.
pub struct OutputStream {
    signals: Vec<BoundSignal>,
    config: OutputConfig,
    gate: StartGate,
    interrupt: Interrupt,
}

impl OutputStream {
    pub fn new(
        signals: Vec<BoundSignal>,
        config: OutputConfig,
        gate: StartGate,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            signals,
            config,
            gate,
            interrupt,
        }
    }

    pub fn channels(&self) -> usize {
        self.signals.len()
    }

    /// Run the session to completion.
    pub fn run(self) -> Result<()> {
        let OutputStream {
            signals,
            config,
            gate,
            interrupt,
        } = self;
        let pipe = config.pipe.clone();

        debug!(pipe = %pipe.display(), phase = ?Phase::PipeOpening, "waiting for a reader");
        let mut writer = PipeWriter::open(&pipe)?;

        let metadata = config.stream_meta.then(|| stream_info(&signals, config.rate));
        let (mux, handles) = FrameMux::new(
            signals.len(),
            MuxConfig {
                encoding: config.encoding,
                metadata,
                queue_depth: config.queue_depth,
            },
            interrupt.clone(),
        );
        let rates = Arc::new(RateLock::new(config.rate.map(Rate::Hz), interrupt.clone()));

        let mut readers = Vec::with_capacity(signals.len());
        for (bound, handle) in signals.into_iter().zip(handles) {
            let rates = Arc::clone(&rates);
            let reader_interrupt = interrupt.clone();
            readers.push(thread::spawn(move || {
                run_reader(bound.source, handle, rates, reader_interrupt)
            }));
        }

        let streamed = stream_frames(mux, &mut writer, &gate, &interrupt, config.encoding.is_text());

        debug!(pipe = %pipe.display(), phase = ?Phase::Draining, "stopping channel readers");
        let mut mismatch: Option<StreamError> = None;
        for (channel, reader) in readers.into_iter().enumerate() {
            if let Some(Err(err)) = join_worker(&format!("channel-{channel}"), reader, JOIN_TIMEOUT)
            {
                // Plain read faults were absorbed by the reader; only a
                // rate mismatch outlives its channel.
                if matches!(err, StreamError::RateMismatch { .. }) {
                    mismatch.get_or_insert(err);
                }
            }
        }
        info!(pipe = %pipe.display(), phase = ?Phase::Closed, "output finished");
        match mismatch {
            // The mismatch outranks the secondary interrupt it caused.
            Some(fault) => Err(fault),
            None => streamed,
        }
    }
}

fn stream_info(signals: &[BoundSignal], rate: Option<f64>) -> StreamInfo {
    StreamInfo {
        channels: signals.len(),
        rate,
        units: signals.iter().map(|s| s.units.clone()).collect(),
        dtype: signals.iter().map(|s| s.dtype).collect(),
    }
}

/// Drain multiplexed frames into the pipe. The first item (preamble or
/// frame) is held at the start gate until every output stream is ready.
fn stream_frames(
    mux: FrameMux,
    writer: &mut PipeWriter,
    gate: &StartGate,
    interrupt: &Interrupt,
    text: bool,
) -> Result<()> {
    let mut first = true;
    for frame in mux {
        let frame = frame?;
        if first {
            debug!(phase = ?Phase::BarrierWait, "waiting for all output streams");
            gate.wait_all(interrupt)?;
            debug!(phase = ?Phase::Streaming, "streaming frames");
            first = false;
        }
        if interrupt.is_set() {
            return Err(StreamError::Interrupted);
        }
        writer.send(&frame, interrupt)?;
        if text {
            writer.send(b"\n", interrupt)?;
        }
        writer.sync()?;
    }
    if first {
        // A session with no frames still owes the gate its arrival.
        gate.wait_all(interrupt)?;
    }
    if interrupt.is_set() {
        return Err(StreamError::Interrupted);
    }
    Ok(())
}
