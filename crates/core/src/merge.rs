//! Transactional merge rules
//!
//! Timestamp-only records are produced by readers (validity-interval
//! extension) and by cache eviction; real writes are produced by committing
//! transactions. Both end up in the same key-value engine, which folds them
//! together during compaction through [`TupleMerge`]. The rules:
//!
//! - old is ts-update, new is anything → drop the old record; its timestamps
//!   are stale relative to any later write.
//! - old is value-bearing, new is ts-update → keep the old class and payload,
//!   adopt the ts-update's `(delta, wts)`.
//! - both value-bearing → application merge over the payloads, rewrapped
//!   with the newer `(delta, wts)`; the surviving class is the older
//!   record's, so an insert overlaid by updates stays a full value.
//! - final merge → application final-merge over the payload, same header. A
//!   ts-update with nothing beneath it survives as-is; the lookup path
//!   treats such a record as "no value, timestamps only".
//!
//! A timestamp bump must never corrupt a value, and when overtaken by a real
//! write it must vanish without producing a phantom insert.

use crate::message::{Message, MessageView};
use crate::timestamp::TimestampWord;
use crate::traits::{MergeHooks, ValueMerge};
use crate::tuple;
use std::sync::Arc;

/// [`MergeHooks`] implementation installed into the key-value engine by the
/// transactional layer. Wraps the application's payload merge.
pub struct TupleMerge {
    app: Arc<dyn ValueMerge>,
}

impl TupleMerge {
    /// Wrap an application merge.
    pub fn new(app: Arc<dyn ValueMerge>) -> Self {
        TupleMerge { app }
    }
}

impl MergeHooks for TupleMerge {
    fn merge(&self, key: &[u8], old: MessageView<'_>, new: MessageView<'_>) -> Message {
        if old.is_ts_update() {
            return new.to_owned();
        }

        if new.is_ts_update() {
            // Timestamp refresh over a real value: the value and class
            // survive, the refreshed (delta, wts) wins.
            let refreshed = match tuple::header(new.bytes) {
                Ok(h) => h.with_lock_bit(false),
                Err(_) => TimestampWord::ZERO,
            };
            let mut bytes = old.bytes.to_vec();
            tuple::write_header(&mut bytes, refreshed);
            return Message::from_encoded(old.class, bytes);
        }

        // Two real values: application merge over the payloads, the newer
        // record's timestamps, the older record's class.
        let merged = self.app.merge(key, old.payload(), new.payload());
        let newer = tuple::header(new.bytes).unwrap_or(TimestampWord::ZERO);
        Message::from_encoded(old.class, tuple::encode_tuple(newer, &merged))
    }

    fn merge_final(&self, key: &[u8], oldest: MessageView<'_>) -> Message {
        if oldest.is_ts_update() {
            // No base record ever existed under this refresh; keep the
            // timestamp shell so the validity interval is not lost.
            return oldest.to_owned();
        }
        let finalized = self.app.merge_final(key, oldest.payload());
        let head = tuple::header(oldest.bytes).unwrap_or(TimestampWord::ZERO);
        Message::from_encoded(oldest.class, tuple::encode_tuple(head, &finalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageClass;
    use crate::traits::LastWriterWins;

    fn hooks() -> TupleMerge {
        TupleMerge::new(Arc::new(LastWriterWins))
    }

    /// Append-style merge used to observe payload combination.
    struct Concat;
    impl ValueMerge for Concat {
        fn merge(&self, _key: &[u8], old: &[u8], new: &[u8]) -> Vec<u8> {
            let mut out = old.to_vec();
            out.extend_from_slice(new);
            out
        }
    }

    fn value(class: MessageClass, delta: u64, wts: u64, payload: &[u8]) -> Vec<u8> {
        tuple::encode_tuple(TimestampWord::new(false, delta, wts), payload)
    }

    #[test]
    fn stale_ts_update_is_discarded() {
        let old = tuple::encode_ts_update(4, 3);
        let new = value(MessageClass::Insert, 0, 9, b"fresh");

        let out = hooks().merge(
            b"k",
            MessageView::new(MessageClass::Update, &old),
            MessageView::new(MessageClass::Insert, &new),
        );
        assert_eq!(out.class, MessageClass::Insert);
        assert_eq!(out.bytes, new);
    }

    #[test]
    fn ts_update_refreshes_value_header() {
        let old = value(MessageClass::Insert, 0, 5, b"V");
        let new = tuple::encode_ts_update(2, 7);

        let out = hooks().merge(
            b"k",
            MessageView::new(MessageClass::Insert, &old),
            MessageView::new(MessageClass::Update, &new),
        );
        assert_eq!(out.class, MessageClass::Insert);
        let h = tuple::header(&out.bytes).unwrap();
        assert!(!h.lock_bit());
        assert_eq!((h.delta(), h.wts()), (2, 7));
        assert_eq!(tuple::payload(&out.bytes), b"V");
    }

    #[test]
    fn value_pair_defers_to_application_merge() {
        let old = value(MessageClass::Insert, 0, 5, b"ab");
        let new = value(MessageClass::Update, 1, 8, b"cd");

        let m = TupleMerge::new(Arc::new(Concat));
        let out = m.merge(
            b"k",
            MessageView::new(MessageClass::Insert, &old),
            MessageView::new(MessageClass::Update, &new),
        );
        // Older class, newer timestamps, merged payload.
        assert_eq!(out.class, MessageClass::Insert);
        let h = tuple::header(&out.bytes).unwrap();
        assert_eq!((h.delta(), h.wts()), (1, 8));
        assert_eq!(tuple::payload(&out.bytes), b"abcd");
    }

    #[test]
    fn final_merge_keeps_ts_update_shell() {
        let shell = tuple::encode_ts_update(1, 6);
        let out = hooks().merge_final(b"k", MessageView::new(MessageClass::Update, &shell));
        assert!(tuple::is_ts_update(&out.bytes));
        let h = tuple::header(&out.bytes).unwrap();
        assert_eq!((h.delta(), h.wts()), (1, 6));
    }

    #[test]
    fn final_merge_passes_value_through() {
        let base = value(MessageClass::Insert, 0, 4, b"V");
        let out = hooks().merge_final(b"k", MessageView::new(MessageClass::Insert, &base));
        assert_eq!(out.bytes, base);
        assert_eq!(out.class, MessageClass::Insert);
    }
}
