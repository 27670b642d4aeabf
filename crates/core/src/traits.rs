//! Trait seams between the transactional layer and its collaborators
//!
//! The transactional layer treats the key-value engine as an external
//! serializable point-query primitive reached through [`KvBackend`]. The
//! engine, in turn, calls back into the transactional layer through
//! [`MergeHooks`] whenever records for the same key meet during compaction.
//!
//! Both traits are object-safe: the coordinator holds `Arc<dyn KvBackend>`
//! and backends hold `Arc<dyn MergeHooks>`, so implementations can be swapped
//! without touching the layers above.

use crate::error::TempoResult;
use crate::message::{Message, MessageView};

/// The key-value engine seam.
///
/// Implementations must be safe to call concurrently from every registered
/// thread. Values are opaque byte records - the transactional layer encodes
/// its tuple header into them before they cross this boundary.
pub trait KvBackend: Send + Sync {
    /// Store a full record for `key`, replacing pending state.
    fn insert(&self, key: &[u8], record: &[u8]) -> TempoResult<()>;

    /// Enqueue a delta record for `key`. The backend resolves deltas lazily
    /// through its registered [`MergeHooks`], at lookup or compaction time.
    fn update(&self, key: &[u8], record: &[u8]) -> TempoResult<()>;

    /// Remove `key` entirely.
    fn delete(&self, key: &[u8]) -> TempoResult<()>;

    /// Point lookup. Returns the (merged) record bytes, or `None` if the key
    /// has no live record.
    fn lookup(&self, key: &[u8]) -> TempoResult<Option<Vec<u8>>>;

    /// Register the calling thread. Backends may keep per-thread state and
    /// reject operations from unregistered threads.
    fn register_thread(&self);

    /// Deregister the calling thread.
    fn deregister_thread(&self);
}

/// Compaction callbacks the key-value engine drives.
///
/// Invoked synchronously whenever two records for one key meet. Hooks must
/// be pure and reentrant - compaction may run them from any registered
/// thread, concurrently for distinct keys.
pub trait MergeHooks: Send + Sync {
    /// Fold an older record into a newer accumulator, producing the
    /// combined record.
    fn merge(&self, key: &[u8], old: MessageView<'_>, new: MessageView<'_>) -> Message;

    /// Finalize the oldest surviving record when nothing older exists
    /// beneath it.
    fn merge_final(&self, key: &[u8], oldest: MessageView<'_>) -> Message;
}

/// Application-supplied merge over raw payloads.
///
/// This is the user half of the merge story: [`MergeHooks`] strips tuple
/// headers and delegates payload combination here. The default
/// implementation behavior is last-writer-wins; accumulator-style
/// applications provide their own.
pub trait ValueMerge: Send + Sync {
    /// Combine an older payload with a newer delta payload.
    fn merge(&self, key: &[u8], old_payload: &[u8], new_payload: &[u8]) -> Vec<u8>;

    /// Finalize a delta payload that has no base beneath it. Defaults to
    /// passing the payload through unchanged.
    fn merge_final(&self, _key: &[u8], payload: &[u8]) -> Vec<u8> {
        payload.to_vec()
    }
}

/// Last-writer-wins payload merge: the newer payload replaces the older.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastWriterWins;

impl ValueMerge for LastWriterWins {
    fn merge(&self, _key: &[u8], _old_payload: &[u8], new_payload: &[u8]) -> Vec<u8> {
        new_payload.to_vec()
    }
}
