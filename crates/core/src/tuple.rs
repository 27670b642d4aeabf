//! On-disk tuple codec
//!
//! Every record handed to the key-value engine is a 16-byte header followed
//! by the application payload:
//!
//! ```text
//! bytes 0..16   packed bit-fields { is_ts_update:1, delta:64, wts:63 }
//! bytes 16..    application payload (absent when is_ts_update = 1)
//! ```
//!
//! The header is the little-endian serialization of a [`TimestampWord`];
//! bit 0, which serves as the soft lock in memory, means `is_ts_update` on
//! disk. The packing must match exactly between the write path and the merge
//! callbacks, which decode headers in place during compaction.

use crate::error::{TempoError, TempoResult};
use crate::timestamp::TimestampWord;

/// Size of the tuple header in bytes.
pub const TUPLE_HEADER_LEN: usize = 16;

/// Encode a value-bearing tuple: header followed by payload.
pub fn encode_tuple(header: TimestampWord, payload: &[u8]) -> Vec<u8> {
    debug_assert!(!header.lock_bit(), "value tuples never carry the flag bit");
    let mut bytes = Vec::with_capacity(TUPLE_HEADER_LEN + payload.len());
    bytes.extend_from_slice(&header.raw().to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Encode a timestamp-only record: a header with `is_ts_update = 1` and no
/// payload. Produced by cache eviction writeback.
pub fn encode_ts_update(delta: u64, wts: u64) -> Vec<u8> {
    let header = TimestampWord::new(true, delta, wts);
    header.raw().to_le_bytes().to_vec()
}

/// Decode the header of a stored record.
///
/// # Errors
///
/// Returns [`TempoError::Storage`] if the record is shorter than a header -
/// that only happens when the stored bytes were corrupted.
pub fn header(record: &[u8]) -> TempoResult<TimestampWord> {
    let head: [u8; TUPLE_HEADER_LEN] = record
        .get(..TUPLE_HEADER_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            TempoError::storage(format!(
                "stored record of {} bytes is shorter than the tuple header",
                record.len()
            ))
        })?;
    Ok(TimestampWord::from_raw(u128::from_le_bytes(head)))
}

/// The application payload of a stored record (empty for ts-update records).
pub fn payload(record: &[u8]) -> &[u8] {
    record.get(TUPLE_HEADER_LEN..).unwrap_or(&[])
}

/// Overwrite the header of an encoded record in place.
///
/// Used at commit time to stamp the commit timestamp into a buffered write
/// whose header slot was reserved when the message was built.
pub fn write_header(record: &mut [u8], header: TimestampWord) {
    debug_assert!(record.len() >= TUPLE_HEADER_LEN);
    record[..TUPLE_HEADER_LEN].copy_from_slice(&header.raw().to_le_bytes());
}

/// True if the record is a timestamp-only update.
pub fn is_ts_update(record: &[u8]) -> bool {
    // Bit 0 of the little-endian word lives in byte 0.
    record.first().is_some_and(|b| b & 1 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_round_trip() {
        let h = TimestampWord::new(false, 2, 7);
        let rec = encode_tuple(h, b"hello");
        assert_eq!(rec.len(), TUPLE_HEADER_LEN + 5);
        assert!(!is_ts_update(&rec));
        assert_eq!(header(&rec).unwrap(), h);
        assert_eq!(payload(&rec), b"hello");
    }

    #[test]
    fn ts_update_has_no_payload() {
        let rec = encode_ts_update(3, 11);
        assert_eq!(rec.len(), TUPLE_HEADER_LEN);
        assert!(is_ts_update(&rec));
        let h = header(&rec).unwrap();
        assert!(h.lock_bit());
        assert_eq!(h.delta(), 3);
        assert_eq!(h.wts(), 11);
        assert!(payload(&rec).is_empty());
    }

    #[test]
    fn write_header_preserves_payload() {
        let mut rec = encode_tuple(TimestampWord::ZERO, b"payload");
        write_header(&mut rec, TimestampWord::new(false, 0, 99));
        assert_eq!(header(&rec).unwrap().wts(), 99);
        assert_eq!(payload(&rec), b"payload");
    }

    #[test]
    fn truncated_record_is_a_storage_error() {
        let err = header(&[0u8; 7]).unwrap_err();
        assert!(matches!(err, TempoError::Storage { .. }));
    }

    #[test]
    fn empty_record_is_not_ts_update() {
        assert!(!is_ts_update(&[]));
    }
}
