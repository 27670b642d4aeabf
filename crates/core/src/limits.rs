//! Size limits and key validation
//!
//! Limits are deliberately few: a cap on key length and a cap on the number
//! of distinct keys one transaction may touch. Both exist to bound the
//! memory a single misbehaving transaction can pin.

use crate::error::{TempoError, TempoResult};

/// Maximum key length in bytes.
pub const MAX_KEY_BYTES: usize = 1024;

/// Maximum number of distinct keys a single transaction may touch.
///
/// The read/write set is a linear-scan structure sized for short
/// transactions; this bound keeps the scan cheap and the per-transaction
/// memory predictable.
pub const MAX_RW_ENTRIES: usize = 1024;

/// Validate a user key.
///
/// Keys must be non-empty and at most [`MAX_KEY_BYTES`] long.
///
/// # Errors
///
/// Returns [`TempoError::InvalidKey`] naming the violated rule.
pub fn validate_key(key: &[u8]) -> TempoResult<()> {
    if key.is_empty() {
        return Err(TempoError::InvalidKey {
            reason: "key is empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(TempoError::InvalidKey {
            reason: format!("key of {} bytes exceeds maximum {}", key.len(), MAX_KEY_BYTES),
        });
    }
    Ok(())
}
