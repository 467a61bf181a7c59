use std::fmt::Write as _;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Magic bytes introducing a binary-mode preamble header: "SM".
pub const PREAMBLE_MAGIC: [u8; 2] = [0x53, 0x4D];

/// Maximum accepted preamble payload.
pub const MAX_PREAMBLE: usize = 64 * 1024;

/// Fixed-width on-wire sample encoding, NumPy-style token names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 32-bit float, the default stream datatype.
    #[default]
    F4,
    /// 64-bit float.
    F8,
}

impl Dtype {
    pub fn width(self) -> usize {
        match self {
            Dtype::F4 => 4,
            Dtype::F8 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dtype::F4 => "f4",
            Dtype::F8 => "f8",
        }
    }

    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "f4" => Ok(Dtype::F4),
            "f8" => Ok(Dtype::F8),
            other => Err(FrameError::UnsupportedDtype(other.to_string())),
        }
    }
}

/// How frames are laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Newline-delimited text frames, whitespace-separated fields.
    Text,
    /// Fixed-size records of native-endian values, no delimiter.
    Binary(Dtype),
}

impl Encoding {
    pub fn is_text(self) -> bool {
        matches!(self, Encoding::Text)
    }
}

/// One value slot contributed by a channel to a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// A single sample from a uniformly sampled channel.
    Value(f64),
    /// A whole (time, value) point list from a non-uniform channel,
    /// carried as one opaque unit.
    Points(Vec<(f64, f64)>),
    /// The channel has ended; a placeholder keeps field positions stable.
    Missing,
}

/// Self-describing stream header, sent as the first record when the
/// metadata channel is enabled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub channels: usize,
    /// Shared sampling rate in Hz; `None` for irregular streams.
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dtype: Vec<Dtype>,
}

/// A demultiplexed data record: frame index plus one value per channel.
/// Missing contributions decode as NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub index: u64,
    pub values: Vec<f64>,
}

/// Total wire size of one binary data record.
pub fn binary_record_size(channels: usize, dtype: Dtype) -> usize {
    4 + channels * dtype.width()
}

/// Encode a text frame: `<index> <v0> <v1> ... <vN-1>`, no terminator.
///
/// Values use the shortest round-trip decimal form. Missing slots render
/// as `nan`; point lists render as one `t1:v1;t2:v2;...` field.
pub fn encode_text_frame(index: u64, slots: &[Slot], dst: &mut BytesMut) {
    let _ = write!(dst, "{index}");
    for slot in slots {
        dst.put_u8(b' ');
        match slot {
            Slot::Value(value) => put_text_value(*value, dst),
            Slot::Missing => dst.put_slice(b"nan"),
            Slot::Points(points) => put_text_points(points, dst),
        }
    }
}

fn put_text_value(value: f64, dst: &mut BytesMut) {
    if value.is_nan() {
        dst.put_slice(b"nan");
    } else {
        let _ = write!(dst, "{value}");
    }
}

fn put_text_points(points: &[(f64, f64)], dst: &mut BytesMut) {
    if points.is_empty() {
        dst.put_slice(b"nan");
        return;
    }
    for (n, (time, value)) in points.iter().enumerate() {
        if n > 0 {
            dst.put_u8(b';');
        }
        let _ = write!(dst, "{time}:{value}");
    }
}

/// Encode a binary frame: `u32` index followed by one native-endian
/// value per channel. Point lists are rejected.
pub fn encode_binary_frame(
    index: u64,
    slots: &[Slot],
    dtype: Dtype,
    dst: &mut BytesMut,
) -> Result<()> {
    dst.reserve(binary_record_size(slots.len(), dtype));
    dst.put_slice(&(index as u32).to_ne_bytes());
    for slot in slots {
        let value = match slot {
            Slot::Value(value) => *value,
            Slot::Missing => f64::NAN,
            Slot::Points(_) => return Err(FrameError::IrregularInBinary),
        };
        match dtype {
            Dtype::F4 => dst.put_slice(&(value as f32).to_ne_bytes()),
            Dtype::F8 => dst.put_slice(&value.to_ne_bytes()),
        }
    }
    Ok(())
}

/// Encode the text preamble record: `# ` followed by a JSON object.
pub fn encode_text_preamble(info: &StreamInfo, dst: &mut BytesMut) -> Result<()> {
    let json = serde_json::to_string(info)?;
    dst.put_slice(b"# ");
    dst.put_slice(json.as_bytes());
    Ok(())
}

/// Encode the binary preamble header: magic, `u32` little-endian
/// payload length, JSON payload.
pub fn encode_binary_preamble(info: &StreamInfo, dst: &mut BytesMut) -> Result<()> {
    let json = serde_json::to_vec(info)?;
    if json.len() > MAX_PREAMBLE {
        return Err(FrameError::PreambleTooLarge {
            size: json.len(),
            max: MAX_PREAMBLE,
        });
    }
    dst.reserve(6 + json.len());
    dst.put_slice(&PREAMBLE_MAGIC);
    dst.put_u32_le(json.len() as u32);
    dst.put_slice(&json);
    Ok(())
}

/// Whether a text record is the metadata preamble (receivers branch on
/// the first record to detect it).
pub fn is_text_preamble(record: &[u8]) -> bool {
    record.first() == Some(&b'#')
}

/// Parse a text preamble record back into [`StreamInfo`].
pub fn decode_text_preamble(record: &[u8]) -> Result<StreamInfo> {
    let body = record.strip_prefix(b"#").unwrap_or(record);
    Ok(serde_json::from_slice(body)?)
}

/// Outcome of probing a binary stream head for a preamble header.
#[derive(Clone, Debug, PartialEq)]
pub enum BinaryPreamble {
    /// Not enough buffered bytes to decide yet.
    Incomplete,
    /// The stream carries no preamble; data records start immediately.
    Absent,
    /// A complete preamble header was consumed from the buffer.
    Present(StreamInfo),
}

/// Probe (and on success consume) a binary preamble header at the front
/// of `buf`.
pub fn decode_binary_preamble(buf: &mut BytesMut) -> Result<BinaryPreamble> {
    if buf.len() < PREAMBLE_MAGIC.len() {
        return Ok(BinaryPreamble::Incomplete);
    }
    if buf[..2] != PREAMBLE_MAGIC {
        return Ok(BinaryPreamble::Absent);
    }
    if buf.len() < 6 {
        return Ok(BinaryPreamble::Incomplete);
    }
    let len = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;
    if len > MAX_PREAMBLE {
        return Err(FrameError::PreambleTooLarge {
            size: len,
            max: MAX_PREAMBLE,
        });
    }
    if buf.len() < 6 + len {
        return Ok(BinaryPreamble::Incomplete);
    }
    buf.advance(6);
    let payload = buf.split_to(len);
    let info = serde_json::from_slice(&payload)?;
    Ok(BinaryPreamble::Present(info))
}

/// Decode a text data record into per-channel values.
///
/// Field 0 is the frame index and is not channel data. Point-list
/// fields are opaque to scalar consumers and decode as a
/// [`FrameError::BadRecord`], which receivers log and skip.
pub fn decode_text_record(record: &[u8], channels: usize) -> Result<Record> {
    let text = std::str::from_utf8(record).map_err(|_| FrameError::BadRecord {
        reason: "not utf-8",
        fragment: String::from_utf8_lossy(record).into_owned(),
    })?;
    let mut fields = text.split_whitespace();
    let index_field = fields.next().ok_or(FrameError::BadRecord {
        reason: "empty record",
        fragment: text.to_string(),
    })?;
    let index: u64 = index_field.parse().map_err(|_| FrameError::BadRecord {
        reason: "bad frame index",
        fragment: index_field.to_string(),
    })?;

    let mut values = Vec::with_capacity(channels);
    for field in fields {
        let value: f64 = field.parse().map_err(|_| FrameError::BadRecord {
            reason: "bad numeric field",
            fragment: field.to_string(),
        })?;
        values.push(value);
    }
    if values.len() != channels {
        return Err(FrameError::FieldCount {
            got: values.len(),
            expected: channels,
        });
    }
    Ok(Record { index, values })
}

/// Decode one fixed-size binary record.
pub fn decode_binary_record(record: &[u8], channels: usize, dtype: Dtype) -> Result<Record> {
    let expected = binary_record_size(channels, dtype);
    if record.len() != expected {
        return Err(FrameError::BadRecord {
            reason: "record size",
            fragment: format!("{} bytes, expected {expected}", record.len()),
        });
    }
    let index = u32::from_ne_bytes([record[0], record[1], record[2], record[3]]) as u64;
    let mut values = Vec::with_capacity(channels);
    let width = dtype.width();
    for channel in 0..channels {
        let start = 4 + channel * width;
        let value = match dtype {
            Dtype::F4 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&record[start..start + 4]);
                f32::from_ne_bytes(raw) as f64
            }
            Dtype::F8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&record[start..start + 8]);
                f64::from_ne_bytes(raw)
            }
        };
        values.push(value);
    }
    Ok(Record { index, values })
}
