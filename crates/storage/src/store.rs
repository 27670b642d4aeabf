//! Message-folding store
//!
//! An in-memory stand-in for a log-structured key-value engine, faithful to
//! the piece of LSM behavior the transactional layer depends on: *update
//! messages are not resolved eagerly*. Each key holds a base record plus a
//! stack of pending delta messages; lookups fold the stack through the
//! registered merge hooks without persisting, and an explicit [`compact`]
//! pass folds stacks down into their base records the way a background
//! compactor would.
//!
//! [`compact`]: MessageStore::compact
//!
//! # Sharding
//!
//! A `DashMap` keyed by the owned key bytes with an `FxHasher` - lock-free
//! reads, per-shard write locks, no cross-key contention.
//!
//! # Thread registration
//!
//! Threads must register before issuing operations; operations from
//! unregistered threads fail with `ThreadNotRegistered`. This mirrors
//! engines that keep per-thread scratch state and makes the misuse loud
//! instead of subtly racy.

use dashmap::{DashMap, DashSet};
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use std::thread::ThreadId;
use tempo_core::traits::MergeHooks;
use tempo_core::{Message, MessageClass, TempoError, TempoResult};
use tracing::debug;

/// Per-key state: a folded base record plus pending deltas, oldest first.
#[derive(Debug, Default)]
struct Slot {
    base: Option<Message>,
    pending: Vec<Message>,
}

impl Slot {
    /// Fold pending deltas (and the base, if any) into one record.
    ///
    /// Records are combined newest-to-oldest: the newest message is the
    /// accumulator and each older record is merged beneath it. A stack with
    /// no base record is finalized through `merge_final`.
    fn fold(&self, key: &[u8], hooks: &dyn MergeHooks) -> Option<Message> {
        let newest = match self.pending.last() {
            Some(m) => m,
            None => return self.base.clone(),
        };

        let mut acc = newest.clone();
        for older in self.pending.iter().rev().skip(1) {
            acc = hooks.merge(key, older.view(), acc.view());
        }
        match &self.base {
            Some(base) => acc = hooks.merge(key, base.view(), acc.view()),
            None => acc = hooks.merge_final(key, acc.view()),
        }
        Some(acc)
    }
}

/// In-memory message-folding key-value engine.
///
/// Implements [`tempo_core::KvBackend`]; constructed around the merge hooks
/// it will drive during folding and compaction, exactly the way a real
/// engine receives its data configuration at open time.
pub struct MessageStore {
    slots: DashMap<Box<[u8]>, Slot, FxBuildHasher>,
    hooks: Arc<dyn MergeHooks>,
    registered: DashSet<ThreadId>,
}

impl MessageStore {
    /// Create an empty store around the given merge hooks.
    pub fn new(hooks: Arc<dyn MergeHooks>) -> Self {
        MessageStore {
            slots: DashMap::with_hasher(FxBuildHasher),
            hooks,
            registered: DashSet::new(),
        }
    }

    /// Number of keys with live records.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no key holds a record.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fold every pending stack into its base record.
    ///
    /// This is the compaction the transactional merge rules are written
    /// for: timestamp-only refreshes are absorbed into the values beneath
    /// them and stale refreshes overtaken by real writes disappear.
    pub fn compact(&self) {
        let mut folded = 0usize;
        for mut entry in self.slots.iter_mut() {
            let (key, slot) = entry.pair_mut();
            if slot.pending.is_empty() {
                continue;
            }
            let merged = slot.fold(key, self.hooks.as_ref());
            slot.base = merged;
            slot.pending.clear();
            folded += 1;
        }
        debug!(keys = folded, "compacted pending message stacks");
    }

    fn check_registered(&self) -> TempoResult<()> {
        if self.registered.contains(&std::thread::current().id()) {
            Ok(())
        } else {
            Err(TempoError::ThreadNotRegistered)
        }
    }
}

impl tempo_core::KvBackend for MessageStore {
    fn insert(&self, key: &[u8], record: &[u8]) -> TempoResult<()> {
        self.check_registered()?;
        let mut slot = self.slots.entry(key.into()).or_default();
        slot.base = Some(Message::from_encoded(MessageClass::Insert, record.to_vec()));
        slot.pending.clear();
        Ok(())
    }

    fn update(&self, key: &[u8], record: &[u8]) -> TempoResult<()> {
        self.check_registered()?;
        let mut slot = self.slots.entry(key.into()).or_default();
        slot.pending
            .push(Message::from_encoded(MessageClass::Update, record.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> TempoResult<()> {
        self.check_registered()?;
        self.slots.remove(key);
        Ok(())
    }

    fn lookup(&self, key: &[u8]) -> TempoResult<Option<Vec<u8>>> {
        self.check_registered()?;
        let slot = match self.slots.get(key) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        Ok(slot.fold(key, self.hooks.as_ref()).map(|m| m.bytes))
    }

    fn register_thread(&self) {
        self.registered.insert(std::thread::current().id());
    }

    fn deregister_thread(&self) {
        self.registered.remove(&std::thread::current().id());
    }
}
