use std::path::PathBuf;

use bytes::BytesMut;
use sigmux_frame::{
    binary_record_size, decode_binary_preamble, decode_binary_record, decode_text_preamble,
    decode_text_record, is_text_preamble, split_records, BinaryPreamble, Dtype, Encoding,
    RecordShape, StreamInfo,
};
use sigmux_repo::{RecordingStore, SignalSink};
use sigmux_transport::{Interrupt, PipeReader, TransportError};
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::worker::Phase;

const READ_CHUNK: usize = 8 * 1024;

/// Configuration of one input stream session.
pub struct InputConfig {
    pub pipe: PathBuf,
    pub encoding: Encoding,
    /// Locked rate of the incoming stream; the recording duration is
    /// derived from it at finalization.
    pub rate: f64,
    /// Frames accumulated per channel before a sink flush.
    pub batch: usize,
    /// Per-channel sink datatypes.
    pub dtypes: Vec<Dtype>,
}

/// Per-channel accumulation of decoded values, flushed to sinks in
/// batches.
struct Accumulator {
    columns: Vec<Vec<f64>>,
    rows: usize,
    capacity: usize,
}

impl Accumulator {
    fn new(channels: usize, capacity: usize) -> Self {
        Self {
            columns: (0..channels).map(|_| Vec::new()).collect(),
            rows: 0,
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, values: &[f64]) {
        for (column, value) in self.columns.iter_mut().zip(values) {
            // NaN marks an ended channel's placeholder, not a sample.
            if !value.is_nan() {
                column.push(*value);
            }
        }
        self.rows += 1;
    }

    fn is_full(&self) -> bool {
        self.rows >= self.capacity
    }

    fn is_empty(&self) -> bool {
        self.rows == 0
    }

    fn take(&mut self) -> Vec<Vec<f64>> {
        self.rows = 0;
        self.columns
            .iter_mut()
            .map(std::mem::take)
            .collect()
    }
}

/// A read-mode pipe session: reassembles frames from the byte stream,
/// batches values per channel, and forwards filled batches to the data
/// sink.
///
/// Phases: `Created → PipeOpening` (nonblocking) `→ Streaming →
/// Flushing → Closed`. End-of-stream flushes the remainder and
/// finalizes the sink with the total recording duration; an interrupted
/// session still flushes what arrived before unwinding.
pub struct InputStream {
    store: Box<dyn RecordingStore>,
    sinks: Vec<Box<dyn SignalSink>>,
    config: InputConfig,
    interrupt: Interrupt,
}

impl InputStream {
    pub fn new(
        store: Box<dyn RecordingStore>,
        sinks: Vec<Box<dyn SignalSink>>,
        config: InputConfig,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            store,
            sinks,
            config,
            interrupt,
        }
    }

    pub fn channels(&self) -> usize {
        self.sinks.len()
    }

    /// Run the session to completion.
    pub fn run(mut self) -> Result<()> {
        let channels = self.sinks.len();
        let pipe = self.config.pipe.clone();
        debug!(pipe = %pipe.display(), phase = ?Phase::PipeOpening, "opening pipe for reading");
        let mut reader = PipeReader::open(&pipe)?;
        debug!(pipe = %pipe.display(), phase = ?Phase::Streaming, "reassembling frames");

        let shape = match self.config.encoding {
            Encoding::Text => RecordShape::Lines,
            Encoding::Binary(dtype) => RecordShape::Fixed(binary_record_size(channels, dtype)),
        };

        let mut buf = BytesMut::with_capacity(READ_CHUNK * 2);
        let mut chunk = [0u8; READ_CHUNK];
        let mut acc = Accumulator::new(channels, self.config.batch);
        let mut frames = 0u64;
        let mut head_checked = false;
        let interrupt = self.interrupt.clone();

        let mut streamed = Ok(());
        loop {
            match reader.recv(&mut chunk, &interrupt) {
                Ok(Some(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(None) => break,
                Err(TransportError::Interrupted) => {
                    streamed = Err(StreamError::Interrupted);
                    break;
                }
                Err(err) => {
                    streamed = Err(err.into());
                    break;
                }
            }
            if let Err(err) =
                self.drain_records(&mut buf, shape, &mut head_checked, &mut acc, &mut frames)
            {
                streamed = Err(err);
                break;
            }
        }

        debug!(pipe = %pipe.display(), phase = ?Phase::Flushing, frames, "flushing remainder");
        let flushed = self.flush(&mut acc).and_then(|()| {
            let duration = frames as f64 / self.config.rate;
            self.store.finalize(duration).map_err(Into::into)
        });
        info!(pipe = %pipe.display(), frames, phase = ?Phase::Closed, "input finished");
        streamed.and(flushed)
    }

    /// Pull complete records out of the reassembly buffer and feed the
    /// accumulator. The first record may be a metadata preamble.
    fn drain_records(
        &mut self,
        buf: &mut BytesMut,
        shape: RecordShape,
        head_checked: &mut bool,
        acc: &mut Accumulator,
        frames: &mut u64,
    ) -> Result<()> {
        let channels = self.sinks.len();

        if !*head_checked {
            if let Encoding::Binary(_) = self.config.encoding {
                match decode_binary_preamble(buf)? {
                    BinaryPreamble::Incomplete => return Ok(()),
                    BinaryPreamble::Absent => *head_checked = true,
                    BinaryPreamble::Present(info) => {
                        self.note_preamble(&info);
                        *head_checked = true;
                    }
                }
            }
        }

        for record in split_records(buf, shape) {
            if self.config.encoding.is_text() && !*head_checked {
                *head_checked = true;
                if is_text_preamble(&record) {
                    match decode_text_preamble(&record) {
                        Ok(info) => self.note_preamble(&info),
                        Err(err) => warn!(%err, "unreadable stream preamble"),
                    }
                    continue;
                }
            }
            let decoded = match self.config.encoding {
                Encoding::Text => decode_text_record(&record, channels),
                Encoding::Binary(dtype) => decode_binary_record(&record, channels, dtype),
            };
            match decoded {
                Ok(parsed) => {
                    *frames += 1;
                    acc.push(&parsed.values);
                    if acc.is_full() {
                        self.flush(acc)?;
                    }
                }
                Err(err) => {
                    // Transient corruption: skip the record, keep the
                    // session alive.
                    warn!(%err, "skipping malformed record");
                }
            }
        }
        Ok(())
    }

    fn note_preamble(&self, info: &StreamInfo) {
        if info.channels != self.sinks.len() {
            warn!(
                announced = info.channels,
                bound = self.sinks.len(),
                "stream preamble disagrees on channel count"
            );
        } else {
            debug!(channels = info.channels, rate = ?info.rate, "stream preamble");
        }
    }

    fn flush(&mut self, acc: &mut Accumulator) -> Result<()> {
        if acc.is_empty() {
            return Ok(());
        }
        for (channel, (sink, column)) in self.sinks.iter_mut().zip(acc.take()).enumerate() {
            if column.is_empty() {
                continue;
            }
            let dtype = self
                .config
                .dtypes
                .get(channel)
                .copied()
                .unwrap_or_default();
            sink.append(&column, dtype)?;
        }
        Ok(())
    }
}
