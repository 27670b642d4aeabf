//! Timestamp cache
//!
//! A bounded concurrent map from owned key bytes to a shared
//! [`AtomicTimestampWord`] cell. The cache is the transactional layer's soft
//! lock table: the `lock_bit` of a cached word is the only write lock in the
//! system, and the `(delta, wts)` fields are the key's current validity
//! interval.
//!
//! # Sharing model
//!
//! Every live transaction touching a key holds one reference on that key's
//! entry; concurrent transactions share a single cell. The cell handle is an
//! `Arc`, so it stays valid for as long as any holder keeps it, but the
//! *entry* leaves the cache as soon as the last reference is released. An
//! entry leaving the cache is an **eviction**: the final word is returned to
//! the releasing caller, which must persist its `(delta, wts)` as a
//! timestamp-only record before the interval is forgotten.
//!
//! # Bounds
//!
//! Capacity is fixed at construction (`1 << log_slots`). When every slot is
//! taken by a referenced entry, inserts fail with `CacheFull` - the cache
//! never blocks and never evicts a referenced entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use tempo_core::{AtomicTimestampWord, TempoError, TempoResult, TimestampWord};

/// A shared timestamp cell, valid while the holder's cache reference lives.
pub type SharedCell = Arc<AtomicTimestampWord>;

struct CacheEntry {
    cell: SharedCell,
    refs: usize,
}

/// Bounded, refcounted map from key bytes to timestamp cells.
pub struct TimestampCache {
    entries: DashMap<Box<[u8]>, CacheEntry, FxBuildHasher>,
    capacity: usize,
    /// When set, entries are never removed on release (pins every key's
    /// timestamps in memory for the lifetime of the cache).
    pin_all: bool,
}

impl TimestampCache {
    /// Create a cache with `1 << log_slots` slots.
    pub fn new(log_slots: u8, pin_all: bool) -> Self {
        TimestampCache {
            entries: DashMap::with_hasher(FxBuildHasher),
            capacity: 1usize << log_slots.min(31),
            pin_all,
        }
    }

    /// Slot capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Acquire a reference on `key`'s entry, installing a zero word if the
    /// key is absent.
    ///
    /// Returns the shared cell and whether this call created the entry. The
    /// cell pointer remains stable until the matching [`release`].
    ///
    /// [`release`]: TimestampCache::release
    ///
    /// # Errors
    ///
    /// [`TempoError::CacheFull`] when the key is absent and every slot is
    /// occupied by a referenced entry.
    pub fn insert_and_get(&self, key: &[u8]) -> TempoResult<(SharedCell, bool)> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.refs += 1;
            return Ok((entry.cell.clone(), false));
        }

        match self.entries.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                // Raced another inserter; share its cell.
                occupied.get_mut().refs += 1;
                Ok((occupied.get().cell.clone(), false))
            }
            Entry::Vacant(vacant) => {
                if self.entries.len() >= self.capacity {
                    return Err(TempoError::CacheFull);
                }
                let cell: SharedCell = Arc::new(AtomicTimestampWord::zero());
                vacant.insert(CacheEntry {
                    cell: cell.clone(),
                    refs: 1,
                });
                Ok((cell, true))
            }
        }
    }

    /// Release one reference on `key`'s entry.
    ///
    /// When the last reference is dropped the entry is evicted and its final
    /// word returned; the caller owns persisting it. Entries are never
    /// evicted while referenced, and never evicted at all in pin-all mode.
    pub fn release(&self, key: &[u8]) -> Option<TimestampWord> {
        match self.entries.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                debug_assert!(entry.refs > 0, "release without matching acquire");
                entry.refs = entry.refs.saturating_sub(1);
                if entry.refs == 0 && !self.pin_all {
                    let (_, evicted) = occupied.remove_entry();
                    return Some(evicted.cell.load());
                }
                None
            }
            Entry::Vacant(_) => {
                debug_assert!(false, "release of a key that is not resident");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn fresh_entry_starts_at_zero() {
        let cache = TimestampCache::new(4, false);
        let (cell, fresh) = cache.insert_and_get(b"k").unwrap();
        assert!(fresh);
        assert!(cell.load().is_zero());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_holders_share_one_cell() {
        let cache = TimestampCache::new(4, false);
        let (a, fresh_a) = cache.insert_and_get(b"k").unwrap();
        let (b, fresh_b) = cache.insert_and_get(b"k").unwrap();
        assert!(fresh_a);
        assert!(!fresh_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        // First release keeps the entry alive for the second holder.
        assert!(cache.release(b"k").is_none());
        assert_eq!(cache.len(), 1);
        let evicted = cache.release(b"k");
        assert!(evicted.is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_returns_final_word() {
        let cache = TimestampCache::new(4, false);
        let (cell, _) = cache.insert_and_get(b"k").unwrap();
        let word = TimestampWord::new(false, 3, 9);
        cell.compare_exchange(TimestampWord::ZERO, word).unwrap();

        let evicted = cache.release(b"k").unwrap();
        assert_eq!(evicted, word);

        // Re-inserting starts from zero again; the interval must have been
        // persisted by the releasing caller.
        let (cell, fresh) = cache.insert_and_get(b"k").unwrap();
        assert!(fresh);
        assert!(cell.load().is_zero());
    }

    #[test]
    fn capacity_is_enforced() {
        let cache = TimestampCache::new(1, false); // two slots
        cache.insert_and_get(b"a").unwrap();
        cache.insert_and_get(b"b").unwrap();
        assert!(matches!(cache.insert_and_get(b"c"), Err(TempoError::CacheFull)));

        // Releasing a slot makes room.
        cache.release(b"a");
        assert!(cache.insert_and_get(b"c").is_ok());
    }

    #[test]
    fn pin_all_keeps_unreferenced_entries() {
        let cache = TimestampCache::new(4, true);
        let (cell, _) = cache.insert_and_get(b"k").unwrap();
        cell.compare_exchange(TimestampWord::ZERO, TimestampWord::new(false, 0, 7))
            .unwrap();
        assert!(cache.release(b"k").is_none());
        assert_eq!(cache.len(), 1);

        // A later acquire sees the pinned word instead of zero.
        let (cell, fresh) = cache.insert_and_get(b"k").unwrap();
        assert!(!fresh);
        assert_eq!(cell.load().wts(), 7);
    }

    #[test]
    fn racing_inserts_of_one_key_agree() {
        let cache = Arc::new(TimestampCache::new(8, false));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let (cell, _) = cache.insert_and_get(b"hot").unwrap();
                    Arc::as_ptr(&cell) as usize
                })
            })
            .collect();

        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]), "holders saw different cells");
        assert_eq!(cache.len(), 1);

        for _ in 0..8 {
            cache.release(b"hot");
        }
        assert!(cache.is_empty());
    }
}
