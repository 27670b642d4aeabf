//! Per-transaction read/write set
//!
//! An unsorted, bounded sequence of entries, one per distinct key the
//! transaction has touched. Linear scan on access is deliberate:
//! transactions are short, and a scan over a handful of entries beats a
//! hash map's constant factors while keeping the structure trivially
//! resettable.

use crate::tscache::SharedCell;
use tempo_core::limits::MAX_RW_ENTRIES;
use tempo_core::{Message, TempoError, TempoResult};

/// State tracked for one key inside a transaction.
#[derive(Default)]
pub struct RwEntry {
    /// Owned copy of the user key.
    pub key: Box<[u8]>,
    /// Buffered local write, if any. The message's header slot is stamped
    /// with the commit timestamp at install time.
    pub msg: Option<Message>,
    /// Write timestamp observed at read time.
    pub wts: u64,
    /// Read timestamp observed at read time.
    pub rts: u64,
    /// Shared timestamp cell, attached on first use of the key.
    pub cell: Option<SharedCell>,
    /// Whether any lookup went through this entry. OR-ed cumulatively; a
    /// key both read and written participates in both halves of commit.
    pub is_read: bool,
}

impl RwEntry {
    /// Whether this entry buffers a write.
    pub fn is_write(&self) -> bool {
        self.msg.is_some()
    }
}

/// The bounded entry sequence.
#[derive(Default)]
pub struct ReadWriteSet {
    entries: Vec<RwEntry>,
}

impl ReadWriteSet {
    /// Find or append the entry for `key`, OR-ing in `is_read`.
    ///
    /// Returns the entry's index - the set only grows until [`reset`], so
    /// indices stay stable for the life of the transaction.
    ///
    /// [`reset`]: ReadWriteSet::reset
    ///
    /// # Errors
    ///
    /// [`TempoError::TransactionLimit`] once the transaction has touched
    /// `MAX_RW_ENTRIES` distinct keys.
    pub fn get_or_create(&mut self, key: &[u8], is_read: bool) -> TempoResult<usize> {
        if let Some(pos) = self.entries.iter().position(|e| &*e.key == key) {
            self.entries[pos].is_read |= is_read;
            return Ok(pos);
        }

        if self.entries.len() >= MAX_RW_ENTRIES {
            return Err(TempoError::TransactionLimit {
                limit: MAX_RW_ENTRIES,
            });
        }

        self.entries.push(RwEntry {
            key: key.into(),
            is_read,
            ..RwEntry::default()
        });
        Ok(self.entries.len() - 1)
    }

    /// All entries, in touch order.
    pub fn entries(&self) -> &[RwEntry] {
        &self.entries
    }

    /// All entries, mutable.
    pub fn entries_mut(&mut self) -> &mut [RwEntry] {
        &mut self.entries
    }

    /// Number of distinct keys touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no key has been touched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, returning the set to its post-begin state.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Drain entries out for release processing.
    pub fn drain(&mut self) -> std::vec::Drain<'_, RwEntry> {
        self.entries.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::MessageClass;

    #[test]
    fn one_entry_per_key() {
        let mut set = ReadWriteSet::default();
        let a = set.get_or_create(b"k", false).unwrap();
        let b = set.get_or_create(b"k", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn is_read_accumulates() {
        let mut set = ReadWriteSet::default();
        let i = set.get_or_create(b"k", true).unwrap();
        set.get_or_create(b"k", false).unwrap();
        assert!(set.entries()[i].is_read, "a later write must not clear the read flag");
    }

    #[test]
    fn read_and_write_flags_are_independent() {
        let mut set = ReadWriteSet::default();
        let i = set.get_or_create(b"k", true).unwrap();
        set.entries_mut()[i].msg = Some(Message::from_payload(MessageClass::Insert, b"v"));
        let e = &set.entries()[i];
        assert!(e.is_read);
        assert!(e.is_write());
    }

    #[test]
    fn limit_is_enforced() {
        let mut set = ReadWriteSet::default();
        for i in 0..MAX_RW_ENTRIES {
            set.get_or_create(format!("key-{i}").as_bytes(), false).unwrap();
        }
        let err = set.get_or_create(b"one-too-many", false).unwrap_err();
        assert!(matches!(err, TempoError::TransactionLimit { .. }));

        // Existing keys are still reachable at the limit.
        assert!(set.get_or_create(b"key-0", true).is_ok());
    }

    #[test]
    fn reset_clears_everything() {
        let mut set = ReadWriteSet::default();
        set.get_or_create(b"k", true).unwrap();
        set.reset();
        assert!(set.is_empty());
    }
}
