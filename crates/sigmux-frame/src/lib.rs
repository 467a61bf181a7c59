//! Frame multiplexing and demultiplexing for signal channel streams.
//!
//! The producer side ([`FrameMux`]) interleaves per-channel sample
//! queues into one ordered sequence of serialized frames, optionally led
//! by a self-describing metadata preamble. The consumer side
//! ([`split_records`] plus the record decoders) reassembles complete
//! frames from arbitrary chunk boundaries and recovers per-channel
//! values.

pub mod codec;
pub mod demux;
pub mod error;
pub mod mux;

pub use codec::{
    binary_record_size, decode_binary_preamble, decode_binary_record, decode_text_preamble,
    decode_text_record, encode_binary_frame, encode_binary_preamble, encode_text_frame,
    encode_text_preamble, is_text_preamble, BinaryPreamble, Dtype, Encoding, Record, Slot,
    StreamInfo, PREAMBLE_MAGIC,
};
pub use demux::{split_records, RecordShape};
pub use error::{FrameError, Result};
pub use mux::{ChannelHandle, FrameMux, MuxConfig, DEFAULT_QUEUE_DEPTH};
