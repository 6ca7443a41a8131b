//! Log events and their binary record codec.
//!
//! A record is laid out as:
//!
//! | Offset | Size  | Field                                   |
//! |--------|-------|-----------------------------------------|
//! | 0      | 8     | timestamp, `i64` big-endian (ns)        |
//! | 8      | 1..10 | message length, unsigned LEB128 varint  |
//! | …      | len   | message bytes, UTF-8                    |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// An opaque raw record as produced by the storage layer.
pub type Record = Vec<u8>;

/// Encoded size of the timestamp header.
pub const TIMESTAMP_SIZE: usize = 8;

/// Longest valid LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// A timestamped text log record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEvent {
    timestamp: i64,
    message: String,
}

impl LogEvent {
    /// Creates an event from a nanosecond timestamp and a message.
    #[must_use]
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// Creates an event from a wall-clock time.
    ///
    /// Returns `None` if the time is outside the range representable in
    /// nanoseconds (roughly years 1677 to 2262).
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>, message: impl Into<String>) -> Option<Self> {
        at.timestamp_nanos_opt().map(|ts| Self::new(ts, message))
    }

    /// Nanoseconds since the Unix epoch.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The log message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The timestamp as a wall-clock time.
    #[must_use]
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp)
    }

    /// Exact number of bytes [`marshal`](Self::marshal) writes.
    #[must_use]
    pub fn writable_size(&self) -> usize {
        let len = self.message.len();
        TIMESTAMP_SIZE + varint_len(len as u64) + len
    }

    /// Writes the encoding into `buf`, which must be exactly
    /// [`writable_size`](Self::writable_size) bytes long.
    ///
    /// Nothing is written when the size check fails.
    pub fn marshal(&self, buf: &mut [u8]) -> Result<usize> {
        let expected = self.writable_size();
        if buf.len() != expected {
            return Err(QueryError::BufferSize {
                expected,
                actual: buf.len(),
            });
        }

        self.write_to(buf);
        Ok(expected)
    }

    /// Writes the encoding into a buffer already sized by `writable_size`.
    fn write_to(&self, buf: &mut [u8]) {
        buf[..TIMESTAMP_SIZE].copy_from_slice(&self.timestamp.to_be_bytes());
        let mut offset = TIMESTAMP_SIZE;
        offset += put_varint(&mut buf[offset..], self.message.len() as u64);
        buf[offset..].copy_from_slice(self.message.as_bytes());
    }

    /// Decodes one event from the front of `buf`, returning it together with
    /// the number of bytes consumed.
    pub fn unmarshal(buf: &[u8]) -> Result<(Self, usize)> {
        let Some((ts_bytes, rest)) = buf.split_first_chunk::<TIMESTAMP_SIZE>() else {
            return Err(QueryError::Decode(format!(
                "record of {} bytes is shorter than the {TIMESTAMP_SIZE}-byte header",
                buf.len()
            )));
        };
        let timestamp = i64::from_be_bytes(*ts_bytes);

        let (len, varint_size) = get_varint(rest)?;
        let rest = &rest[varint_size..];
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= rest.len())
            .ok_or_else(|| {
                QueryError::Decode(format!(
                    "declared message length {len} exceeds the {} remaining bytes",
                    rest.len()
                ))
            })?;

        let message = std::str::from_utf8(&rest[..len])
            .map_err(|e| QueryError::Decode(format!("message is not valid UTF-8: {e}")))?;

        let consumed = TIMESTAMP_SIZE + varint_size + len;
        Ok((Self::new(timestamp, message), consumed))
    }
}

/// Encodes an event into a freshly allocated record.
#[must_use]
pub fn encode(event: &LogEvent) -> Record {
    let mut buf = vec![0u8; event.writable_size()];
    event.write_to(&mut buf);
    buf
}

/// Decodes a record that must contain exactly one event.
pub fn decode(record: &[u8]) -> Result<LogEvent> {
    let (event, consumed) = LogEvent::unmarshal(record)?;
    if consumed != record.len() {
        return Err(QueryError::Decode(format!(
            "{} trailing bytes after event",
            record.len() - consumed
        )));
    }
    Ok(event)
}

const fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

fn put_varint(buf: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

fn get_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        let low = u64::from(byte & 0x7f);
        // The tenth byte may only carry the single remaining bit.
        if i == MAX_VARINT_LEN - 1 && low > 1 {
            return Err(QueryError::Decode("message length overflows u64".to_string()));
        }
        value |= low << (7 * i);
        if byte & 0x80 == 0 {
            // Only the shortest encoding is canonical.
            if i > 0 && *byte == 0 {
                return Err(QueryError::Decode(
                    "message length varint is not minimally encoded".to_string(),
                ));
            }
            return Ok((value, i + 1));
        }
    }

    if buf.len() >= MAX_VARINT_LEN {
        Err(QueryError::Decode("message length varint is too long".to_string()))
    } else {
        Err(QueryError::Decode("truncated message length".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    // ===========================================
    // Encoding
    // ===========================================

    #[test]
    fn writable_size_matches_encoding() {
        let event = LogEvent::new(42, "hello");
        assert_eq!(event.writable_size(), 8 + 1 + 5);
        assert_eq!(encode(&event).len(), event.writable_size());
    }

    #[test]
    fn layout_is_big_endian_timestamp_then_varint() {
        let record = encode(&LogEvent::new(1, "ab"));
        assert_eq!(record, vec![0, 0, 0, 0, 0, 0, 0, 1, 2, b'a', b'b']);
    }

    #[test]
    fn long_message_uses_multibyte_length() {
        let message = "x".repeat(300);
        let event = LogEvent::new(-5, message.clone());
        assert_eq!(event.writable_size(), 8 + 2 + 300);

        let decoded = decode(&encode(&event)).expect("decode");
        assert_eq!(decoded.message(), message);
        assert_eq!(decoded.timestamp(), -5);
    }

    #[test_case(0 ; "empty buffer")]
    #[test_case(13 ; "one byte short")]
    #[test_case(15 ; "one byte long")]
    fn marshal_rejects_wrong_buffer(size: usize) {
        let event = LogEvent::new(7, "hello");
        let mut buf = vec![0xAAu8; size];
        let err = event.marshal(&mut buf);
        assert_eq!(
            err,
            Err(QueryError::BufferSize {
                expected: 14,
                actual: size
            })
        );
        assert!(buf.iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn varint_len_boundaries() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(16_383), 2);
        assert_eq!(varint_len(16_384), 3);
        assert_eq!(varint_len(u64::MAX), 10);
    }

    // ===========================================
    // Decoding
    // ===========================================

    #[test]
    fn decode_empty_message() {
        let event = LogEvent::new(i64::MIN, "");
        assert_eq!(decode(&encode(&event)), Ok(event));
    }

    #[test]
    fn decode_every_truncation_fails() {
        let record = encode(&LogEvent::new(99, "truncate me"));
        for len in 0..record.len() {
            let result = decode(&record[..len]);
            assert!(
                matches!(result, Err(QueryError::Decode(_))),
                "prefix of {len} bytes decoded to {result:?}"
            );
        }
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut record = encode(&LogEvent::new(1, "a"));
        record.push(0);
        assert!(matches!(decode(&record), Err(QueryError::Decode(_))));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let mut record = vec![0u8; 8];
        record.extend_from_slice(&[2, 0xC3, 0x28]);
        assert!(matches!(decode(&record), Err(QueryError::Decode(_))));
    }

    #[test]
    fn decode_rejects_overlong_varint() {
        let mut record = vec![0u8; 8];
        record.extend_from_slice(&[0xFF; 11]);
        assert!(matches!(decode(&record), Err(QueryError::Decode(_))));
    }

    #[test]
    fn decode_rejects_padded_varint() {
        // 0x81 0x00 is a two-byte spelling of length 1.
        let mut record = vec![0u8; 8];
        record.extend_from_slice(&[0x81, 0x00, b'x']);
        let err = decode(&record);
        assert!(matches!(err, Err(QueryError::Decode(msg)) if msg.contains("minimally")));

        // The canonical one-byte form still decodes.
        let mut record = vec![0u8; 8];
        record.extend_from_slice(&[0x01, b'x']);
        assert_eq!(decode(&record), Ok(LogEvent::new(0, "x")));
    }

    #[test]
    fn encode_matches_marshal() {
        let event = LogEvent::new(-5, "same bytes");
        let mut buf = vec![0u8; event.writable_size()];
        event.marshal(&mut buf).expect("marshal");
        assert_eq!(encode(&event), buf);
    }

    #[test]
    fn decode_rejects_length_beyond_buffer() {
        let mut record = vec![0u8; 8];
        record.extend_from_slice(&[0x7F, b'a']);
        let err = decode(&record);
        assert!(matches!(err, Err(QueryError::Decode(msg)) if msg.contains("127")));
    }

    #[test]
    fn unmarshal_reports_consumed_bytes() {
        let first = LogEvent::new(1, "one");
        let second = LogEvent::new(2, "two");
        let mut buf = encode(&first);
        buf.extend(encode(&second));

        let (decoded, used) = LogEvent::unmarshal(&buf).expect("first");
        assert_eq!(decoded, first);
        let (decoded, rest) = LogEvent::unmarshal(&buf[used..]).expect("second");
        assert_eq!(decoded, second);
        assert_eq!(used + rest, buf.len());
    }

    // ===========================================
    // Time conversion
    // ===========================================

    #[test]
    fn datetime_roundtrip() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123456789Z")
            .expect("parse")
            .with_timezone(&Utc);
        let event = LogEvent::from_datetime(at, "boot").expect("in range");
        assert_eq!(event.datetime(), at);
        assert_eq!(event.timestamp(), 1_714_557_600_123_456_789);
    }

    #[test]
    fn serde_json_roundtrip() {
        let event = LogEvent::new(3, "asd3f");
        let json = serde_json::to_string(&event).expect("serialize");
        assert_eq!(json, r#"{"timestamp":3,"message":"asd3f"}"#);
        let parsed: LogEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, event);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(ts in any::<i64>(), message in ".*") {
            let event = LogEvent::new(ts, message);
            prop_assert_eq!(decode(&encode(&event)), Ok(event));
        }

        #[test]
        fn prop_delimiter_heavy_messages_survive(
            ts in any::<i64>(),
            message in "[=,'\"\\\\{}\\x00\\n ]{0,64}"
        ) {
            let event = LogEvent::new(ts, message);
            prop_assert_eq!(decode(&encode(&event)), Ok(event));
        }

        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&bytes);
        }
    }
}
