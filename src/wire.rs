//! Wire protocol for the sort-offload service.
//!
//! Every exchange is length-prefixed:
//!
//! - Request: `u32 payload_len (BE) || payload`
//! - Response: `u64 processing_ms (BE) || u64 sort_ms (BE) ||
//!   u32 payload_len (BE) || payload`
//!
//! The payload itself is self-describing: `u32 count (BE)` followed by
//! `count` signed 32-bit big-endian integers. A payload whose declared
//! count disagrees with its byte length is malformed, and malformed input
//! is fatal to the owning connection; there is no per-frame recovery and
//! no structured error on the wire.

use crate::error::Error;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read};
use std::time::Duration;

/// Bytes in a frame's length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bytes in the response header preceding the sorted-array frame
/// (two 8-byte durations).
pub const RESPONSE_HEADER_SIZE: usize = 16;

/// Encode an array as a self-describing payload: count, then elements.
pub fn encode_array(values: &[i32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + 4 * values.len());
    buf.put_u32(values.len() as u32);
    for &value in values {
        buf.put_i32(value);
    }
    buf.freeze()
}

/// Decode a self-describing array payload.
pub fn decode_array(payload: &[u8]) -> Result<Vec<i32>, Error> {
    if payload.len() < 4 {
        return Err(Error::MalformedFrame("payload shorter than element count"));
    }
    let count = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;

    let expected = count
        .checked_mul(4)
        .and_then(|n| n.checked_add(4))
        .ok_or(Error::MalformedFrame("element count overflows payload size"))?;
    if payload.len() != expected {
        return Err(Error::MalformedFrame("element count disagrees with payload length"));
    }

    let mut values = Vec::with_capacity(count);
    for chunk in payload[4..].chunks_exact(4) {
        values.push(i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(values)
}

/// Encode a complete request frame (length prefix + array payload).
pub fn encode_request(values: &[i32]) -> Bytes {
    let payload = encode_array(values);
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    buf.freeze()
}

/// Response as the ordered chunk sequence a sender transmits: processing
/// duration, sort duration, payload length, payload.
///
/// The chunk granularity matches what the multiplexed write side queues;
/// blocking writers can just iterate and write.
pub fn response_chunks(processing: Duration, sort: Duration, payload: Bytes) -> [Bytes; 4] {
    let len_prefix = Bytes::copy_from_slice(&(payload.len() as u32).to_be_bytes());
    [
        Bytes::copy_from_slice(&duration_ms(processing).to_be_bytes()),
        Bytes::copy_from_slice(&duration_ms(sort).to_be_bytes()),
        len_prefix,
        payload,
    ]
}

/// Response as one contiguous buffer, for the blocking architectures.
pub fn encode_response(processing: Duration, sort: Duration, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_SIZE + LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u64(duration_ms(processing));
    buf.put_u64(duration_ms(sort));
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Millisecond truncation used for both measured durations.
pub fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Read one length-prefixed frame from a blocking stream.
///
/// Returns `Ok(None)` when the peer closed cleanly at a frame boundary.
/// A close after the length prefix started arriving is a malformed frame.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, Error> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(Error::MalformedFrame("stream closed inside length prefix")),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::MalformedFrame("stream closed inside payload")
        } else {
            Error::Io(e)
        }
    })?;
    Ok(Some(payload))
}

/// Read a big-endian u64, blocking until all eight bytes arrive.
pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_array_round_trip() {
        let values = vec![3, -1, 6, i32::MAX, i32::MIN, 0];
        let payload = encode_array(&values);
        assert_eq!(decode_array(&payload).unwrap(), values);
    }

    #[test]
    fn test_empty_array() {
        let payload = encode_array(&[]);
        assert_eq!(payload.len(), 4);
        assert_eq!(decode_array(&payload).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_decode_short_payload() {
        assert!(matches!(
            decode_array(&[0, 0, 1]),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_count_mismatch() {
        // Declares two elements but carries one.
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u32.to_be_bytes());
        payload.extend_from_slice(&7i32.to_be_bytes());
        assert!(matches!(
            decode_array(&payload),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut payload = encode_array(&[1, 2]).to_vec();
        payload.push(0xff);
        assert!(matches!(
            decode_array(&payload),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_response_layout() {
        let payload = encode_array(&[-1, 3, 6]);
        let response = encode_response(
            Duration::from_millis(12),
            Duration::from_millis(5),
            &payload,
        );

        assert_eq!(&response[..8], &12u64.to_be_bytes());
        assert_eq!(&response[8..16], &5u64.to_be_bytes());
        assert_eq!(&response[16..20], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&response[20..], &payload[..]);
    }

    #[test]
    fn test_response_chunks_match_contiguous() {
        let payload = encode_array(&[41, 756]);
        let contiguous = encode_response(
            Duration::from_millis(3),
            Duration::from_millis(1),
            &payload,
        );

        let chunks = response_chunks(
            Duration::from_millis(3),
            Duration::from_millis(1),
            payload,
        );
        let mut joined = Vec::new();
        for chunk in &chunks {
            joined.extend_from_slice(chunk);
        }
        assert_eq!(joined, contiguous);
    }

    #[test]
    fn test_read_frame() {
        let frame = encode_request(&[5, 4, 3]);
        let mut cursor = Cursor::new(frame.to_vec());
        let payload = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decode_array(&payload).unwrap(), vec![5, 4, 3]);
    }

    #[test]
    fn test_read_frame_clean_close() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_read_frame_truncated_prefix() {
        let mut cursor = Cursor::new(vec![0, 0]);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_read_frame_truncated_payload() {
        // Declares 8 payload bytes, delivers 3, then closes.
        let mut data = 8u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            read_frame(&mut cursor),
            Err(Error::MalformedFrame(_))
        ));
    }
}
