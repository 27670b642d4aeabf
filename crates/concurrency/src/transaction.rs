//! Transaction handle and lookup results
//!
//! A [`Transaction`] is a plain value owned by exactly one thread at a time.
//! Beginning a transaction just resets it - no global state is touched, no
//! timestamp is allocated, nothing blocks. All coordination happens at
//! commit.

use crate::rwset::ReadWriteSet;

/// Per-transaction state: the read/write set plus nothing else.
///
/// Reusable across transactions on the same thread; `begin` resets it in
/// place, and both commit and abort leave it empty.
#[derive(Default)]
pub struct Transaction {
    pub(crate) rws: ReadWriteSet,
}

impl Transaction {
    /// A fresh, empty transaction.
    pub fn new() -> Self {
        Transaction::default()
    }

    /// Return to the post-begin state, dropping any buffered operations.
    pub fn reset(&mut self) {
        self.rws.reset();
    }

    /// Number of distinct keys this transaction has touched.
    pub fn key_count(&self) -> usize {
        self.rws.len()
    }

    /// True when no operation has been buffered.
    pub fn is_empty(&self) -> bool {
        self.rws.is_empty()
    }
}

/// Reusable buffer a lookup fills.
///
/// Callers allocate one and pass it to every lookup; the value buffer is
/// reused across calls instead of reallocating per read.
#[derive(Debug, Default)]
pub struct LookupResult {
    found: bool,
    value: Vec<u8>,
}

impl LookupResult {
    /// An empty result buffer.
    pub fn new() -> Self {
        LookupResult::default()
    }

    /// Whether the last lookup found a value.
    pub fn found(&self) -> bool {
        self.found
    }

    /// The value from the last lookup (empty when not found).
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub(crate) fn set(&mut self, bytes: &[u8]) {
        self.found = true;
        self.value.clear();
        self.value.extend_from_slice(bytes);
    }

    pub(crate) fn clear(&mut self) {
        self.found = false;
        self.value.clear();
    }
}
