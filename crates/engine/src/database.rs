//! Transactional database handle
//!
//! [`TransactionalDb`] wires the pieces together: it constructs the
//! key-value engine around the transactional merge rules, builds the
//! transaction manager on top, and exposes the operation surface
//! applications program against. The handle is `Send + Sync`; transactions
//! are caller-owned values used by one thread at a time.
//!
//! ## Lifecycle
//!
//! ```text
//! create(config) ─▶ register_thread() ─▶ begin/ops/commit ... ─▶ close()
//! ```
//!
//! `open` exists alongside `create` to mirror engines with durable state;
//! for the in-process message store both start empty.

use crate::config::TransactionalConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempo_concurrency::{LookupResult, Transaction, TransactionManager};
use tempo_core::traits::{KvBackend, ValueMerge};
use tempo_core::{IsolationLevel, LastWriterWins, TempoError, TempoResult, TupleMerge};
use tempo_storage::MessageStore;
use tracing::debug;

/// A transactional database over an embeddable key-value engine.
pub struct TransactionalDb {
    store: Arc<MessageStore>,
    manager: TransactionManager,
    closed: AtomicBool,
}

impl TransactionalDb {
    /// Create a database with last-writer-wins value semantics.
    pub fn create(config: TransactionalConfig) -> Self {
        Self::create_with_merge(config, Arc::new(LastWriterWins))
    }

    /// Create a database around an application-supplied payload merge.
    ///
    /// The merge is installed into the engine's compaction path (wrapped in
    /// the transactional rules) and also combines repeated updates to one
    /// key inside a transaction.
    pub fn create_with_merge(config: TransactionalConfig, app_merge: Arc<dyn ValueMerge>) -> Self {
        let hooks = Arc::new(TupleMerge::new(app_merge.clone()));
        let store = Arc::new(MessageStore::new(hooks));
        let manager =
            TransactionManager::new(store.clone(), app_merge, config.manager_options());
        debug!(
            tsc_log_slots = config.tsc_log_slots,
            bypass = config.bypass_backend,
            "transactional database created"
        );
        TransactionalDb {
            store,
            manager,
            closed: AtomicBool::new(false),
        }
    }

    /// Open a database on existing storage.
    ///
    /// Identical to [`create`] for the in-process engine, which holds no
    /// state across processes; kept separate so callers written against
    /// durable engines read naturally.
    ///
    /// [`create`]: TransactionalDb::create
    pub fn open(config: TransactionalConfig) -> Self {
        Self::create(config)
    }

    /// Drain pending storage work and mark the handle closed.
    ///
    /// Every subsequent operation fails with [`TempoError::HandleClosed`].
    /// In-flight transactions on other threads should be finished first.
    pub fn close(&self) {
        self.store.compact();
        self.closed.store(true, Ordering::SeqCst);
        debug!("transactional database closed");
    }

    /// Register the calling thread with the underlying engine. Must be
    /// called on each thread before it issues operations.
    pub fn register_thread(&self) {
        self.store.register_thread();
    }

    /// Deregister the calling thread.
    pub fn deregister_thread(&self) {
        self.store.deregister_thread();
    }

    /// Begin (or re-begin) a transaction: resets it in place. No global
    /// state is touched.
    pub fn begin(&self, txn: &mut Transaction) -> TempoResult<()> {
        self.check_open()?;
        self.manager.begin(txn);
        Ok(())
    }

    /// Buffer an insert of `value` under `key`.
    pub fn insert(&self, txn: &mut Transaction, key: &[u8], value: &[u8]) -> TempoResult<()> {
        self.check_open()?;
        self.manager.insert(txn, key, value)
    }

    /// Buffer an update delta under `key`.
    pub fn update(&self, txn: &mut Transaction, key: &[u8], delta: &[u8]) -> TempoResult<()> {
        self.check_open()?;
        self.manager.update(txn, key, delta)
    }

    /// Buffer a delete of `key`.
    pub fn delete(&self, txn: &mut Transaction, key: &[u8]) -> TempoResult<()> {
        self.check_open()?;
        self.manager.delete(txn, key)
    }

    /// Transactional lookup into a reusable result buffer.
    pub fn lookup(
        &self,
        txn: &mut Transaction,
        key: &[u8],
        result: &mut LookupResult,
    ) -> TempoResult<()> {
        self.check_open()?;
        self.manager.lookup(txn, key, result)
    }

    /// Convenience lookup returning an owned value.
    pub fn get(&self, txn: &mut Transaction, key: &[u8]) -> TempoResult<Option<Vec<u8>>> {
        let mut result = LookupResult::new();
        self.lookup(txn, key, &mut result)?;
        Ok(result.found().then(|| result.value().to_vec()))
    }

    /// Commit the transaction. Returns the commit timestamp, or a
    /// retryable [`TempoError::Conflict`] if validation failed.
    pub fn commit(&self, txn: &mut Transaction) -> TempoResult<u64> {
        self.check_open()?;
        self.manager.commit(txn)
    }

    /// Abort the transaction, releasing its resources. Always succeeds on
    /// an open handle.
    pub fn abort(&self, txn: &mut Transaction) -> TempoResult<()> {
        self.check_open()?;
        self.manager.abort(txn);
        Ok(())
    }

    /// Current isolation level.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.manager.isolation_level()
    }

    /// Change the isolation level for subsequent commits on every thread.
    pub fn set_isolation_level(&self, level: IsolationLevel) {
        self.manager.set_isolation_level(level);
    }

    /// Run a storage compaction pass, folding pending timestamp refreshes
    /// and deltas into their base records.
    pub fn compact(&self) {
        self.store.compact();
    }

    /// The underlying engine (exposed for tests and tooling).
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    fn check_open(&self) -> TempoResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TempoError::HandleClosed);
        }
        Ok(())
    }
}
