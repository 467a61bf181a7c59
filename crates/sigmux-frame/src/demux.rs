use bytes::{Bytes, BytesMut};

/// Shape of records on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordShape {
    /// Newline-terminated text records.
    Lines,
    /// Fixed-size binary records.
    Fixed(usize),
}

/// Split complete records off the front of `buf`, retaining any
/// incomplete trailing fragment for the next read.
///
/// Pure reassembly over whatever chunk boundaries the OS produced; no
/// I/O. Text records are returned without their line terminator.
pub fn split_records(buf: &mut BytesMut, shape: RecordShape) -> Vec<Bytes> {
    let mut records = Vec::new();
    match shape {
        RecordShape::Lines => {
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let mut line = buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    let len = line.len();
                    line.truncate(len - 1);
                }
                records.push(line.freeze());
            }
        }
        RecordShape::Fixed(size) => {
            if size == 0 {
                return records;
            }
            while buf.len() >= size {
                records.push(buf.split_to(size).freeze());
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_and_fragment_retained() {
        let mut buf = BytesMut::from(&b"0 1.0\n1 2.0\n2 3"[..]);
        let records = split_records(&mut buf, RecordShape::Lines);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref(), b"0 1.0");
        assert_eq!(records[1].as_ref(), b"1 2.0");
        assert_eq!(buf.as_ref(), b"2 3");

        buf.extend_from_slice(b".0\n");
        let more = split_records(&mut buf, RecordShape::Lines);
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].as_ref(), b"2 3.0");
        assert!(buf.is_empty());
    }

    #[test]
    fn any_chunking_yields_the_same_records() {
        let wire = b"0 1.5 2.5\n1 3.5 4.5\n2 5.5 6.5\n";
        // Feed one byte at a time, the worst chunking the OS can produce.
        let mut buf = BytesMut::new();
        let mut records = Vec::new();
        for byte in wire {
            buf.extend_from_slice(&[*byte]);
            records.extend(split_records(&mut buf, RecordShape::Lines));
        }
        assert!(buf.is_empty());
        let collected: Vec<_> = records.iter().map(|r| r.as_ref().to_vec()).collect();
        assert_eq!(
            collected,
            vec![
                b"0 1.5 2.5".to_vec(),
                b"1 3.5 4.5".to_vec(),
                b"2 5.5 6.5".to_vec()
            ]
        );
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let mut buf = BytesMut::from(&b"0 1.0\r\n"[..]);
        let records = split_records(&mut buf, RecordShape::Lines);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref(), b"0 1.0");
    }

    #[test]
    fn fixed_records_split_exactly() {
        let mut buf = BytesMut::from(&[1u8, 2, 3, 4, 5, 6, 7, 8, 9][..]);
        let records = split_records(&mut buf, RecordShape::Fixed(4));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref(), &[1, 2, 3, 4]);
        assert_eq!(records[1].as_ref(), &[5, 6, 7, 8]);
        assert_eq!(buf.as_ref(), &[9]);
    }

    #[test]
    fn zero_size_fixed_records_are_rejected_quietly() {
        let mut buf = BytesMut::from(&[1u8, 2, 3][..]);
        let records = split_records(&mut buf, RecordShape::Fixed(0));
        assert!(records.is_empty());
        assert_eq!(buf.len(), 3);
    }
}
