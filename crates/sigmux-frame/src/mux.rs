use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use sigmux_transport::{Interrupt, POLL_INTERVAL};

use crate::codec::{
    encode_binary_frame, encode_binary_preamble, encode_text_frame, encode_text_preamble,
    Encoding, Slot, StreamInfo,
};
use crate::error::{FrameError, Result};

/// Default bound on per-channel queue depth, in slots. Backpressure: a
/// producer pushing into a full queue blocks until the consumer drains.
pub const DEFAULT_QUEUE_DEPTH: usize = 10_000;

/// Frame multiplexer configuration.
#[derive(Clone, Debug)]
pub struct MuxConfig {
    pub encoding: Encoding,
    /// When set, the very first yielded item is a self-describing
    /// preamble rather than a sample frame.
    pub metadata: Option<StreamInfo>,
    pub queue_depth: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Text,
            metadata: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

enum Entry {
    Slot(Slot),
    End,
}

/// Producer handle bound to one channel slot of a [`FrameMux`].
///
/// Owned by the channel's reader; pushes may run concurrently across
/// different channels.
pub struct ChannelHandle {
    channel: usize,
    sender: Sender<Entry>,
}

impl ChannelHandle {
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Queue uniform samples, one frame slot per sample. Blocks while
    /// the channel queue is full.
    pub fn push_samples(&self, values: &[f64]) -> Result<()> {
        for value in values {
            self.sender
                .send(Entry::Slot(Slot::Value(*value)))
                .map_err(|_| FrameError::ChannelClosed(self.channel))?;
        }
        Ok(())
    }

    /// Queue one whole non-uniform point list as a single frame slot.
    pub fn push_points(&self, points: Vec<(f64, f64)>) -> Result<()> {
        self.sender
            .send(Entry::Slot(Slot::Points(points)))
            .map_err(|_| FrameError::ChannelClosed(self.channel))
    }

    /// Signal end-of-channel. Consumes the handle so the sentinel is
    /// delivered at most once; dropping the handle without calling this
    /// also counts as end-of-channel.
    pub fn finish(self) {
        let _ = self.sender.send(Entry::End);
    }
}

/// Assembles per-channel queues into an ordered, finite sequence of
/// serialized frames.
///
/// Single consumer; iterate to drain. Frame `i` carries every still-open
/// channel's `i`-th queued slot. Assembly blocks, interrupt-aware, until
/// each open channel has contributed or signalled end; a channel that
/// has ended contributes a placeholder and is never waited on again.
/// The sequence terminates once every channel has ended.
pub struct FrameMux {
    receivers: Vec<Receiver<Entry>>,
    open: Vec<bool>,
    index: u64,
    preamble_pending: bool,
    config: MuxConfig,
    interrupt: Interrupt,
}

impl FrameMux {
    /// Create a multiplexer with `channels` slots, returning one
    /// producer handle per slot.
    pub fn new(
        channels: usize,
        config: MuxConfig,
        interrupt: Interrupt,
    ) -> (Self, Vec<ChannelHandle>) {
        let mut receivers = Vec::with_capacity(channels);
        let mut handles = Vec::with_capacity(channels);
        for channel in 0..channels {
            let (sender, receiver) = bounded(config.queue_depth);
            receivers.push(receiver);
            handles.push(ChannelHandle { channel, sender });
        }
        let mux = Self {
            receivers,
            open: vec![true; channels],
            index: 0,
            preamble_pending: config.metadata.is_some(),
            config,
            interrupt,
        };
        (mux, handles)
    }

    /// Number of channel slots.
    pub fn channels(&self) -> usize {
        self.receivers.len()
    }

    /// Take the next slot for `channel`, blocking in poll-sized slices.
    /// `None` means the session was interrupted.
    fn next_slot(&mut self, channel: usize) -> Option<Slot> {
        loop {
            match self.receivers[channel].recv_timeout(POLL_INTERVAL) {
                Ok(Entry::Slot(slot)) => return Some(slot),
                Ok(Entry::End) => {
                    debug!(channel, "channel ended");
                    self.open[channel] = false;
                    return Some(Slot::Missing);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(channel, "channel handle dropped");
                    self.open[channel] = false;
                    return Some(Slot::Missing);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.interrupt.is_set() {
                        return None;
                    }
                }
            }
        }
    }

    fn encode(&self, slots: &[Slot]) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        match self.config.encoding {
            Encoding::Text => encode_text_frame(self.index, slots, &mut dst),
            Encoding::Binary(dtype) => encode_binary_frame(self.index, slots, dtype, &mut dst)?,
        }
        Ok(dst.freeze())
    }

    fn encode_preamble(&self, info: &StreamInfo) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        match self.config.encoding {
            Encoding::Text => encode_text_preamble(info, &mut dst)?,
            Encoding::Binary(_) => encode_binary_preamble(info, &mut dst)?,
        }
        Ok(dst.freeze())
    }
}

impl Iterator for FrameMux {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.preamble_pending {
            self.preamble_pending = false;
            if let Some(info) = self.config.metadata.clone() {
                return Some(self.encode_preamble(&info));
            }
        }

        while self.open.iter().any(|open| *open) {
            let mut slots = Vec::with_capacity(self.receivers.len());
            let mut contributed = false;
            for channel in 0..self.receivers.len() {
                if !self.open[channel] {
                    slots.push(Slot::Missing);
                    continue;
                }
                match self.next_slot(channel) {
                    Some(slot) => {
                        if !matches!(slot, Slot::Missing) {
                            contributed = true;
                        }
                        slots.push(slot);
                    }
                    None => {
                        debug!("frame assembly interrupted");
                        return None;
                    }
                }
            }
            if !contributed {
                // Every remaining channel delivered its end sentinel in
                // this round; there is no frame to emit.
                continue;
            }
            let frame = self.encode(&slots);
            self.index += 1;
            return Some(frame);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::codec::{decode_text_preamble, decode_text_record, is_text_preamble, Dtype};

    fn text_mux(channels: usize) -> (FrameMux, Vec<ChannelHandle>) {
        FrameMux::new(channels, MuxConfig::default(), Interrupt::new())
    }

    #[test]
    fn one_frame_per_submitted_value() {
        let (mux, handles) = text_mux(3);
        for (channel, handle) in handles.into_iter().enumerate() {
            let base = channel as f64 * 10.0;
            handle
                .push_samples(&[base, base + 1.0, base + 2.0, base + 3.0])
                .expect("push should succeed");
            handle.finish();
        }

        let frames: Vec<_> = mux
            .map(|frame| frame.expect("frame should encode"))
            .collect();
        assert_eq!(frames.len(), 4);

        for (i, frame) in frames.iter().enumerate() {
            let record = decode_text_record(frame, 3).expect("frame should decode");
            assert_eq!(record.index, i as u64);
            for channel in 0..3 {
                assert_eq!(record.values[channel], channel as f64 * 10.0 + i as f64);
            }
        }
    }

    #[test]
    fn preamble_is_first_item() {
        let info = StreamInfo {
            channels: 1,
            rate: Some(250.0),
            units: vec![Some("microvolt".to_string())],
            dtype: vec![Dtype::F4],
        };
        let config = MuxConfig {
            metadata: Some(info.clone()),
            ..MuxConfig::default()
        };
        let (mut mux, handles) = FrameMux::new(1, config, Interrupt::new());
        let handle = handles.into_iter().next().expect("one handle");
        handle.push_samples(&[1.0]).expect("push should succeed");
        handle.finish();

        let first = mux
            .next()
            .expect("preamble should be yielded")
            .expect("preamble should encode");
        assert!(is_text_preamble(&first));
        assert_eq!(
            decode_text_preamble(&first).expect("preamble should decode"),
            info
        );

        let second = mux
            .next()
            .expect("data frame should follow")
            .expect("frame should encode");
        assert!(!is_text_preamble(&second));
        assert!(mux.next().is_none());
    }

    #[test]
    fn early_channel_end_leaves_placeholder() {
        let (mux, mut handles) = text_mux(2);
        let late = handles.pop().expect("two handles");
        let early = handles.pop().expect("two handles");

        early.push_samples(&[1.0]).expect("push should succeed");
        early.finish();
        late.push_samples(&[10.0, 20.0, 30.0])
            .expect("push should succeed");
        late.finish();

        let frames: Vec<_> = mux
            .map(|frame| frame.expect("frame should encode"))
            .collect();
        assert_eq!(frames.len(), 3);

        let first = decode_text_record(&frames[0], 2).expect("frame should decode");
        assert_eq!(first.values, vec![1.0, 10.0]);

        let second = decode_text_record(&frames[1], 2).expect("frame should decode");
        assert!(second.values[0].is_nan());
        assert_eq!(second.values[1], 20.0);
    }

    #[test]
    fn dropped_handle_counts_as_end() {
        let (mux, mut handles) = text_mux(2);
        let second = handles.pop().expect("two handles");
        let first = handles.pop().expect("two handles");

        first.push_samples(&[5.0]).expect("push should succeed");
        drop(first);
        second.push_samples(&[6.0]).expect("push should succeed");
        second.finish();

        let frames: Vec<_> = mux
            .map(|frame| frame.expect("frame should encode"))
            .collect();
        assert_eq!(frames.len(), 1);
        let record = decode_text_record(&frames[0], 2).expect("frame should decode");
        assert_eq!(record.values, vec![5.0, 6.0]);
    }

    #[test]
    fn concurrent_producers_preserve_per_channel_order() {
        let (mux, handles) = text_mux(2);
        let mut producers = Vec::new();
        for handle in handles {
            producers.push(thread::spawn(move || {
                for i in 0..100 {
                    handle
                        .push_samples(&[i as f64])
                        .expect("push should succeed");
                }
                handle.finish();
            }));
        }

        let frames: Vec<_> = mux
            .map(|frame| frame.expect("frame should encode"))
            .collect();
        for producer in producers {
            producer.join().expect("producer should finish");
        }

        assert_eq!(frames.len(), 100);
        for (i, frame) in frames.iter().enumerate() {
            let record = decode_text_record(frame, 2).expect("frame should decode");
            assert_eq!(record.values, vec![i as f64, i as f64]);
        }
    }

    #[test]
    fn interrupt_terminates_assembly() {
        let interrupt = Interrupt::new();
        let (mut mux, handles) =
            FrameMux::new(1, MuxConfig::default(), interrupt.clone());
        // Channel stays open with an empty queue; assembly would block.
        interrupt.set();
        assert!(mux.next().is_none());
        drop(handles);
    }

    #[test]
    fn point_list_occupies_one_frame_slot() {
        let (mux, mut handles) = text_mux(2);
        let uniform = handles.pop().expect("two handles");
        let irregular = handles.pop().expect("two handles");

        irregular
            .push_points(vec![(0.1, 1.0), (0.9, 2.0)])
            .expect("push should succeed");
        irregular.finish();
        uniform.push_samples(&[7.0]).expect("push should succeed");
        uniform.finish();

        let frames: Vec<_> = mux
            .map(|frame| frame.expect("frame should encode"))
            .collect();
        assert_eq!(frames.len(), 1);
        let text = std::str::from_utf8(&frames[0]).expect("frame should be utf-8");
        assert_eq!(text, "0 0.1:1;0.9:2 7");
    }

    #[test]
    fn binary_frames_have_fixed_size() {
        let config = MuxConfig {
            encoding: Encoding::Binary(Dtype::F4),
            ..MuxConfig::default()
        };
        let (mux, handles) = FrameMux::new(2, config, Interrupt::new());
        for handle in handles {
            handle
                .push_samples(&[1.0, 2.0])
                .expect("push should succeed");
            handle.finish();
        }

        let frames: Vec<_> = mux
            .map(|frame| frame.expect("frame should encode"))
            .collect();
        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert_eq!(frame.len(), crate::codec::binary_record_size(2, Dtype::F4));
        }
    }
}
