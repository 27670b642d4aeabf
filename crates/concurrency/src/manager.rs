//! Transaction manager: operations and the optimistic commit protocol
//!
//! The manager owns the timestamp cache and the seam to the key-value
//! engine, and drives every transaction through the same four-phase commit:
//!
//! 1. **Partition** the read/write set and seed the commit timestamp from
//!    the observed read timestamps.
//! 2. **Lock** the write set in sorted key order through the cache cells'
//!    `lock_bit` - no-wait: any failed acquisition releases everything
//!    already held, sleeps ~1 µs, and starts the round over.
//! 3. **Validate** every read whose observed validity interval ends before
//!    the commit timestamp: the version must be unchanged, unlocked by
//!    others, and its interval is extended to the commit timestamp by CAS.
//! 4. **Install** the writes through the engine with the commit timestamp
//!    stamped into each tuple header, publish the new `(0, 0, commit_ts)`
//!    word, and release every cache reference.
//!
//! No phase blocks on another transaction. The commit timestamp is derived
//! entirely from observed timestamps - there is no global clock and no
//! counter to contend on.
//!
//! ## Eviction writeback
//!
//! Releasing the last reference on a cache entry evicts it. Any nonzero
//! evicted word is persisted as a timestamp-only record - including on
//! abort, since a concurrent committer may have extended the interval held
//! in the shared cell, and dropping that extension would let a later writer
//! commit inside an interval another transaction already read.

use crate::rwset::RwEntry;
use crate::transaction::{LookupResult, Transaction};
use crate::tscache::{SharedCell, TimestampCache};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempo_core::traits::{KvBackend, ValueMerge};
use tempo_core::{
    tuple, validate_key, IsolationLevel, Message, MessageClass, TempoError, TempoResult,
    TimestampWord,
};
use tracing::{debug, error, trace};

/// Pause between no-wait lock rounds, from the protocol's published tuning.
const LOCK_RETRY_PAUSE: Duration = Duration::from_micros(1);

/// Construction knobs for [`TransactionManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// log₂ of the timestamp-cache slot count.
    pub tsc_log_slots: u8,
    /// Isolation level applied to commits; changeable at runtime.
    pub isolation: IsolationLevel,
    /// Serve lookups from the timestamp cache alone and skip engine writes
    /// at install time. A measurement knob, off by default.
    pub bypass_backend: bool,
    /// Never evict cache entries whose refcount reaches zero.
    pub keep_all_cached_keys: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        ManagerOptions {
            tsc_log_slots: 20,
            isolation: IsolationLevel::default(),
            bypass_backend: false,
            keep_all_cached_keys: false,
        }
    }
}

/// A write-set member captured for commit: the entry index plus its cell,
/// cloned up front so lock handling never contends with entry borrows.
struct CommitSlot {
    idx: usize,
    cell: SharedCell,
}

/// Coordinates transactions over one key-value engine.
pub struct TransactionManager {
    backend: Arc<dyn KvBackend>,
    cache: TimestampCache,
    value_merge: Arc<dyn ValueMerge>,
    isolation: AtomicU8,
    bypass: bool,
}

impl TransactionManager {
    /// Build a manager around an engine and an application payload merge.
    pub fn new(
        backend: Arc<dyn KvBackend>,
        value_merge: Arc<dyn ValueMerge>,
        options: ManagerOptions,
    ) -> Self {
        TransactionManager {
            backend,
            cache: TimestampCache::new(options.tsc_log_slots, options.keep_all_cached_keys),
            value_merge,
            isolation: AtomicU8::new(isolation_to_u8(options.isolation)),
            bypass: options.bypass_backend,
        }
    }

    /// The timestamp cache (exposed for observability and tests).
    pub fn cache(&self) -> &TimestampCache {
        &self.cache
    }

    /// Current isolation level.
    pub fn isolation_level(&self) -> IsolationLevel {
        isolation_from_u8(self.isolation.load(Ordering::Relaxed))
    }

    /// Change the isolation level for subsequent commits.
    pub fn set_isolation_level(&self, level: IsolationLevel) {
        self.isolation.store(isolation_to_u8(level), Ordering::Relaxed);
    }

    /// Reset `txn` to a fresh transaction.
    pub fn begin(&self, txn: &mut Transaction) {
        txn.reset();
    }

    /// Buffer an insert of `value` under `key`.
    pub fn insert(&self, txn: &mut Transaction, key: &[u8], value: &[u8]) -> TempoResult<()> {
        self.local_write(txn, key, Message::from_payload(MessageClass::Insert, value))
    }

    /// Buffer an update delta under `key`.
    pub fn update(&self, txn: &mut Transaction, key: &[u8], delta: &[u8]) -> TempoResult<()> {
        self.local_write(txn, key, Message::from_payload(MessageClass::Update, delta))
    }

    /// Buffer a delete of `key`.
    pub fn delete(&self, txn: &mut Transaction, key: &[u8]) -> TempoResult<()> {
        self.local_write(txn, key, Message::delete())
    }

    /// Transactional point lookup.
    ///
    /// Returns the transaction's own buffered write when one exists;
    /// otherwise reads through the engine, folds the stored timestamps into
    /// the shared cache cell, and records the observed `(wts, rts)` for
    /// commit-time validation. Only the first read of a key records an
    /// observation: keeping the original `(wts, rts)` means a version change
    /// between two reads of the same key fails validation instead of being
    /// silently absorbed.
    pub fn lookup(
        &self,
        txn: &mut Transaction,
        key: &[u8],
        result: &mut LookupResult,
    ) -> TempoResult<()> {
        validate_key(key)?;
        let idx = txn.rws.get_or_create(key, false)?;
        let cell = self.attach_cell(&mut txn.rws.entries_mut()[idx])?;
        let entry = &mut txn.rws.entries_mut()[idx];

        if let Some(msg) = &entry.msg {
            // Read-your-write: serve the buffered message. Nothing was
            // observed from shared state, so this does not make the entry a
            // validated read.
            match msg.class {
                MessageClass::Delete => result.clear(),
                _ => result.set(msg.payload()),
            }
            return Ok(());
        }

        let first_read = !entry.is_read;
        entry.is_read = true;

        if self.bypass {
            let word = cell.load();
            if first_read {
                entry.wts = word.wts();
                entry.rts = word.rts();
            }
            result.clear();
            return Ok(());
        }

        loop {
            let observed = cell.load();
            if observed.lock_bit() {
                // A committer is installing this key; its new word lands
                // momentarily.
                std::hint::spin_loop();
                continue;
            }

            let record = self.backend.lookup(&entry.key)?;
            let (stored, has_value) = match &record {
                Some(bytes) => (tuple::header(bytes)?, !tuple::is_ts_update(bytes)),
                None => (TimestampWord::ZERO, false),
            };

            // Fold the stored interval into the cached word; both sides may
            // have advanced independently (cache evictions race lookups).
            let folded = observed
                .with_wts(observed.wts().max(stored.wts()))
                .with_delta(observed.delta().max(stored.delta()));

            if cell.compare_exchange(observed, folded).is_ok() {
                if first_read {
                    entry.wts = folded.wts();
                    entry.rts = folded.rts();
                }
                match &record {
                    Some(bytes) if has_value => result.set(tuple::payload(bytes)),
                    _ => result.clear(),
                }
                return Ok(());
            }
        }
    }

    /// Abort: release every cache reference and drop the buffered state.
    /// Never fails.
    pub fn abort(&self, txn: &mut Transaction) {
        trace!(keys = txn.key_count(), "transaction aborted by caller");
        self.finish(txn);
    }

    /// Run the commit protocol. On success every buffered write is
    /// installed and visible at the returned commit timestamp; on conflict
    /// the transaction is aborted and [`TempoError::Conflict`] is returned.
    pub fn commit(&self, txn: &mut Transaction) -> TempoResult<u64> {
        let isolation = self.isolation_level();

        // Phase 1: partition, and seed commit_ts from the read set.
        let mut writes: Vec<CommitSlot> = Vec::new();
        let mut reads: Vec<CommitSlot> = Vec::new();
        let mut commit_ts: u64 = 0;
        let mut missing_cell = false;
        for (idx, entry) in txn.rws.entries().iter().enumerate() {
            if !entry.is_write() && !entry.is_read {
                continue;
            }
            let cell = match &entry.cell {
                Some(cell) => cell.clone(),
                None => {
                    missing_cell = true;
                    break;
                }
            };
            if entry.is_write() {
                writes.push(CommitSlot {
                    idx,
                    cell: cell.clone(),
                });
            }
            if entry.is_read {
                reads.push(CommitSlot { idx, cell });
                commit_ts = commit_ts.max(isolation.read_seed(entry.wts));
            }
        }
        if missing_cell {
            // A cache-full failure was reported to the caller mid-flight;
            // the transaction cannot be validated.
            self.finish(txn);
            return Err(TempoError::CacheFull);
        }

        // Phase 2: sort the write set - one global acquisition order makes
        // deadlock impossible - then lock it, no-wait.
        {
            let entries = txn.rws.entries();
            writes.sort_by(|a, b| entries[a.idx].key.cmp(&entries[b.idx].key));
        }
        loop {
            let mut acquired = 0;
            for slot in &writes {
                if try_lock_cell(&slot.cell) {
                    acquired += 1;
                } else {
                    break;
                }
            }
            if acquired == writes.len() {
                break;
            }
            for slot in &writes[..acquired] {
                unlock_cell(&slot.cell);
            }
            std::thread::sleep(LOCK_RETRY_PAUSE);
        }

        // Phase 3a: raise commit_ts past every locked row's read timestamp -
        // the new version must order strictly after the last reader of the
        // old one.
        for slot in &writes {
            let locked = slot.cell.load();
            let seeded = locked.wts() != 0 || locked.delta() != 0;
            let row_rts = if seeded || self.bypass {
                locked.rts()
            } else {
                // Fresh cell: the interval lives only in the stored header
                // (the cache dropped this key since it was last touched).
                match self.stored_rts(&txn.rws.entries()[slot.idx].key) {
                    Ok(rts) => rts,
                    Err(e) => {
                        for slot in &writes {
                            unlock_cell(&slot.cell);
                        }
                        self.finish(txn);
                        return Err(e);
                    }
                }
            };
            txn.rws.entries_mut()[slot.idx].rts = row_rts;
            commit_ts = commit_ts.max(row_rts.saturating_add(1));
        }

        // Phase 3b: validate the read set.
        let mut abort_reason: Option<&'static str> = None;
        'reads: for slot in &reads {
            let entry = &txn.rws.entries()[slot.idx];
            if entry.rts >= commit_ts {
                continue;
            }
            loop {
                let current = slot.cell.load();
                if current.wts() != entry.wts {
                    abort_reason = Some("read version was overwritten before commit");
                    break 'reads;
                }
                let current_rts = current.rts();
                if current_rts > commit_ts {
                    // Someone already extended the interval past us.
                    break;
                }
                if current.lock_bit() && !entry.is_write() {
                    abort_reason = Some("validated row is locked by a concurrent writer");
                    break 'reads;
                }
                // Extend the validity interval to commit_ts. The lock bit
                // (ours, when the key is also written) rides along.
                let extended = current.with_delta(commit_ts - current.wts());
                if slot.cell.compare_exchange(current, extended).is_ok() {
                    break;
                }
            }
        }
        if let Some(reason) = abort_reason {
            for slot in &writes {
                unlock_cell(&slot.cell);
            }
            self.finish(txn);
            debug!(commit_ts, reason, "commit validation failed");
            return Err(TempoError::conflict(reason));
        }

        // Phase 4: install the writes and publish the new words.
        let mut install_error: Option<TempoError> = None;
        for (pos, slot) in writes.iter().enumerate() {
            let entry = &mut txn.rws.entries_mut()[slot.idx];
            let outcome = match entry.msg.as_mut() {
                Some(msg) if !self.bypass => {
                    tuple::write_header(&mut msg.bytes, TimestampWord::new(false, 0, commit_ts));
                    match msg.class {
                        MessageClass::Insert => self.backend.insert(&entry.key, &msg.bytes),
                        MessageClass::Update => self.backend.update(&entry.key, &msg.bytes),
                        MessageClass::Delete => self.backend.delete(&entry.key),
                    }
                }
                Some(_) => Ok(()),
                None => Err(TempoError::storage("write-set entry lost its message")),
            };
            if let Err(e) = outcome {
                // No partial-install recovery: earlier installs of this
                // commit stand, the remaining locks are released, and the
                // failure is surfaced as fatal to the transaction.
                error!(error = %e, "storage install failed mid-commit");
                for slot in &writes[pos..] {
                    unlock_cell(&slot.cell);
                }
                install_error = Some(e);
                break;
            }
            publish_version(&slot.cell, commit_ts);
        }
        if let Some(e) = install_error {
            self.finish(txn);
            return Err(e);
        }

        debug!(
            commit_ts,
            writes = writes.len(),
            reads = reads.len(),
            "transaction committed"
        );
        self.finish(txn);
        Ok(commit_ts)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Buffer a write message, combining with any earlier write to the key.
    fn local_write(&self, txn: &mut Transaction, key: &[u8], msg: Message) -> TempoResult<()> {
        validate_key(key)?;
        let idx = txn.rws.get_or_create(key, false)?;
        self.attach_cell(&mut txn.rws.entries_mut()[idx])?;
        let entry = &mut txn.rws.entries_mut()[idx];

        let existing = match &mut entry.msg {
            None => {
                entry.msg = Some(msg);
                return Ok(());
            }
            Some(existing) => existing,
        };

        if msg.class.is_definitive() {
            *existing = msg;
            return Ok(());
        }
        if existing.class == MessageClass::Delete {
            // A delta over a buffered tombstone: the delta's payload is the
            // row's entire new content, so it must install as a full value -
            // installing it as a delta would resurrect the deleted base.
            *existing = Message::from_encoded(MessageClass::Insert, msg.bytes);
            return Ok(());
        }

        // Two deltas (or a delta over a full value): combine the payloads,
        // keeping the earlier message's class.
        let combined = self
            .value_merge
            .merge(key, existing.payload(), msg.payload());
        existing.bytes = tuple::encode_tuple(TimestampWord::ZERO, &combined);
        Ok(())
    }

    /// Attach the key's shared cache cell to an entry, acquiring exactly
    /// one reference no matter how many operations touch the key.
    fn attach_cell(&self, entry: &mut RwEntry) -> TempoResult<SharedCell> {
        if let Some(cell) = &entry.cell {
            return Ok(cell.clone());
        }
        let (cell, _fresh) = self.cache.insert_and_get(&entry.key)?;
        entry.cell = Some(cell.clone());
        Ok(cell)
    }

    /// Read timestamp of the stored version, straight from the tuple header.
    fn stored_rts(&self, key: &[u8]) -> TempoResult<u64> {
        match self.backend.lookup(key)? {
            Some(bytes) => Ok(tuple::header(&bytes)?.rts()),
            None => Ok(0),
        }
    }

    /// Release every cache reference, persisting evicted words.
    fn finish(&self, txn: &mut Transaction) {
        for mut entry in txn.rws.drain() {
            if entry.cell.take().is_none() {
                continue;
            }
            let Some(evicted) = self.cache.release(&entry.key) else {
                continue;
            };
            if evicted.is_zero() || self.bypass {
                continue;
            }
            // Evicted interval leaves memory here; persist it as a
            // timestamp-only record so no later transaction commits inside
            // an interval a reader already observed.
            let record = tuple::encode_ts_update(evicted.delta(), evicted.wts());
            if let Err(e) = self.backend.update(&entry.key, &record) {
                error!(error = %e, "failed to persist evicted timestamps");
            }
        }
    }
}

/// One attempt to set a cell's lock bit. Fails if already locked or raced.
fn try_lock_cell(cell: &SharedCell) -> bool {
    let current = cell.load();
    if current.lock_bit() {
        return false;
    }
    cell.compare_exchange(current, current.with_lock_bit(true))
        .is_ok()
}

/// Clear a cell's lock bit, preserving the timestamps.
fn unlock_cell(cell: &SharedCell) {
    loop {
        let current = cell.load();
        if cell
            .compare_exchange(current, current.with_lock_bit(false))
            .is_ok()
        {
            return;
        }
    }
}

/// Publish `(lock_bit = 0, delta = 0, wts = commit_ts)` for an installed
/// write, releasing the lock in the same CAS.
fn publish_version(cell: &SharedCell, commit_ts: u64) {
    let fresh = TimestampWord::new(false, 0, commit_ts);
    loop {
        let current = cell.load();
        if cell.compare_exchange(current, fresh).is_ok() {
            return;
        }
    }
}

fn isolation_to_u8(level: IsolationLevel) -> u8 {
    match level {
        IsolationLevel::Serializable => 0,
        IsolationLevel::MonotonicReads => 1,
    }
}

fn isolation_from_u8(raw: u8) -> IsolationLevel {
    match raw {
        1 => IsolationLevel::MonotonicReads,
        _ => IsolationLevel::Serializable,
    }
}
