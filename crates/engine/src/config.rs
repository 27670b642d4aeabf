//! Database configuration
//!
//! A small builder-style config: the timestamp-cache size, the isolation
//! level, and two measurement knobs. Storage options are deliberately
//! absent - the in-process engine takes no tuning, and engines that do are
//! configured where they are constructed.

use serde::{Deserialize, Serialize};
use tempo_concurrency::ManagerOptions;
use tempo_core::IsolationLevel;

/// Configuration for a transactional database handle.
///
/// # Example
///
/// ```
/// use tempo_engine::TransactionalConfig;
/// use tempo_core::IsolationLevel;
///
/// let config = TransactionalConfig::default()
///     .with_tsc_log_slots(16)
///     .with_isolation(IsolationLevel::Serializable);
/// assert_eq!(config.tsc_log_slots, 16);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionalConfig {
    /// log₂ of the timestamp-cache slot count.
    #[serde(default = "default_tsc_log_slots")]
    pub tsc_log_slots: u8,
    /// Isolation level for commits; adjustable at runtime on the handle.
    #[serde(default)]
    pub isolation: IsolationLevel,
    /// Serve lookups from the timestamp cache alone and skip engine writes
    /// at install time. Measurement knob; off by default.
    #[serde(default)]
    pub bypass_backend: bool,
    /// Pin every cached key's timestamps in memory, disabling eviction.
    /// Measurement knob; off by default.
    #[serde(default)]
    pub keep_all_cached_keys: bool,
}

fn default_tsc_log_slots() -> u8 {
    20
}

impl Default for TransactionalConfig {
    fn default() -> Self {
        TransactionalConfig {
            tsc_log_slots: default_tsc_log_slots(),
            isolation: IsolationLevel::default(),
            bypass_backend: false,
            keep_all_cached_keys: false,
        }
    }
}

impl TransactionalConfig {
    /// Set the timestamp-cache size (log₂ of the slot count).
    pub fn with_tsc_log_slots(mut self, log_slots: u8) -> Self {
        self.tsc_log_slots = log_slots;
        self
    }

    /// Set the initial isolation level.
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Enable or disable backend bypass.
    pub fn with_bypass_backend(mut self, bypass: bool) -> Self {
        self.bypass_backend = bypass;
        self
    }

    /// Enable or disable cache-entry pinning.
    pub fn with_keep_all_cached_keys(mut self, keep: bool) -> Self {
        self.keep_all_cached_keys = keep;
        self
    }

    pub(crate) fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            tsc_log_slots: self.tsc_log_slots,
            isolation: self.isolation,
            bypass_backend: self.bypass_backend,
            keep_all_cached_keys: self.keep_all_cached_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_shaped() {
        let config = TransactionalConfig::default();
        assert_eq!(config.tsc_log_slots, 20);
        assert_eq!(config.isolation, IsolationLevel::Serializable);
        assert!(!config.bypass_backend);
        assert!(!config.keep_all_cached_keys);
    }

    #[test]
    fn builder_chains() {
        let config = TransactionalConfig::default()
            .with_tsc_log_slots(8)
            .with_isolation(IsolationLevel::MonotonicReads)
            .with_bypass_backend(true)
            .with_keep_all_cached_keys(true);
        assert_eq!(config.tsc_log_slots, 8);
        assert_eq!(config.isolation, IsolationLevel::MonotonicReads);
        assert!(config.bypass_backend);
        assert!(config.keep_all_cached_keys);
    }
}
