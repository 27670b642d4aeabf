//! Isolation levels
//!
//! The commit protocol derives a transaction's commit timestamp from the
//! timestamps it observed. Under [`IsolationLevel::Serializable`] a read of
//! a version written at `wts` forces `commit_ts ≥ wts`; the weaker
//! [`IsolationLevel::MonotonicReads`] biases each read's contribution one
//! tick forward (`wts + 1`), ordering the transaction strictly after the
//! versions it read rather than alongside them.

use serde::{Deserialize, Serialize};

/// Isolation level for all transactions on a handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Full serializability; committed transactions are equivalent to some
    /// serial order consistent with their commit timestamps.
    #[default]
    Serializable,
    /// Forward-biased read timestamps: each read seeds the commit timestamp
    /// with `wts + 1` instead of `wts`.
    MonotonicReads,
}

impl IsolationLevel {
    /// The contribution a read of a version written at `wts` makes to the
    /// commit-timestamp lower bound.
    pub fn read_seed(self, wts: u64) -> u64 {
        match self {
            IsolationLevel::Serializable => wts,
            IsolationLevel::MonotonicReads => wts.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializable_seeds_with_wts() {
        assert_eq!(IsolationLevel::Serializable.read_seed(10), 10);
    }

    #[test]
    fn monotonic_reads_bias_forward() {
        assert_eq!(IsolationLevel::MonotonicReads.read_seed(10), 11);
        assert_eq!(IsolationLevel::MonotonicReads.read_seed(u64::MAX), u64::MAX);
    }
}
