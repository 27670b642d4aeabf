//! Write messages
//!
//! The transactional layer talks to the key-value engine in *messages*: a
//! class (insert / update / delete) plus a tuple-encoded record. Inserts and
//! deletes are *definitive* - they fully determine the row's fate regardless
//! of what preceded them. Updates are deltas that combine with earlier state
//! through the application merge.

use serde::{Deserialize, Serialize};

use crate::timestamp::TimestampWord;
use crate::tuple;

/// Classification of a write message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageClass {
    /// A full value; replaces whatever was there.
    Insert,
    /// A delta; combines with earlier state via the application merge.
    Update,
    /// A tombstone; removes the row.
    Delete,
}

impl MessageClass {
    /// Definitive messages replace any prior buffered write for the same key
    /// within a transaction; updates merge instead.
    pub fn is_definitive(self) -> bool {
        matches!(self, MessageClass::Insert | MessageClass::Delete)
    }
}

/// An owned write message: class plus tuple-encoded bytes.
///
/// The first 16 bytes of `bytes` are the header slot. While the message is
/// buffered in a transaction the slot holds zeroes; commit stamps the final
/// `(delta = 0, wts = commit_ts)` header immediately before install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Insert, update, or delete.
    pub class: MessageClass,
    /// Tuple-encoded record (header slot + payload).
    pub bytes: Vec<u8>,
}

impl Message {
    /// Build a message from a class and an application payload, reserving
    /// the header slot.
    pub fn from_payload(class: MessageClass, payload: &[u8]) -> Self {
        Message {
            class,
            bytes: tuple::encode_tuple(TimestampWord::ZERO, payload),
        }
    }

    /// Build a message from already tuple-encoded bytes.
    pub fn from_encoded(class: MessageClass, bytes: Vec<u8>) -> Self {
        Message { class, bytes }
    }

    /// A delete tombstone (header slot only, no payload).
    pub fn delete() -> Self {
        Message {
            class: MessageClass::Delete,
            bytes: tuple::encode_tuple(TimestampWord::ZERO, &[]),
        }
    }

    /// The application payload (bytes past the header slot).
    pub fn payload(&self) -> &[u8] {
        tuple::payload(&self.bytes)
    }

    /// Borrow this message as a view.
    pub fn view(&self) -> MessageView<'_> {
        MessageView {
            class: self.class,
            bytes: &self.bytes,
        }
    }
}

/// A borrowed view of a message, used by the merge callbacks.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    /// Insert, update, or delete.
    pub class: MessageClass,
    /// Tuple-encoded record.
    pub bytes: &'a [u8],
}

impl<'a> MessageView<'a> {
    /// Construct a view from raw parts.
    pub fn new(class: MessageClass, bytes: &'a [u8]) -> Self {
        MessageView { class, bytes }
    }

    /// True if the record carries only a timestamp refresh.
    pub fn is_ts_update(&self) -> bool {
        tuple::is_ts_update(self.bytes)
    }

    /// The application payload.
    pub fn payload(&self) -> &'a [u8] {
        tuple::payload(self.bytes)
    }

    /// Clone into an owned message.
    pub fn to_owned(self) -> Message {
        Message {
            class: self.class,
            bytes: self.bytes.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitive_classes() {
        assert!(MessageClass::Insert.is_definitive());
        assert!(MessageClass::Delete.is_definitive());
        assert!(!MessageClass::Update.is_definitive());
    }

    #[test]
    fn from_payload_reserves_header_slot() {
        let m = Message::from_payload(MessageClass::Insert, b"v1");
        assert_eq!(m.bytes.len(), tuple::TUPLE_HEADER_LEN + 2);
        assert_eq!(m.payload(), b"v1");
        assert!(!m.view().is_ts_update());
    }

    #[test]
    fn delete_is_header_only() {
        let m = Message::delete();
        assert_eq!(m.class, MessageClass::Delete);
        assert!(m.payload().is_empty());
    }
}
