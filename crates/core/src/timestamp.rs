//! Timestamp words and their atomic cells
//!
//! Every key tracked by the transactional layer is described by a single
//! 128-bit word packing three fields:
//!
//! | bits    | field      | meaning                                          |
//! |---------|------------|--------------------------------------------------|
//! | 0       | `lock_bit` | soft write lock (in memory) / `is_ts_update` (on disk) |
//! | 1..=64  | `delta`    | distance from write timestamp to read timestamp  |
//! | 65..=127| `wts`      | write timestamp of the current version           |
//!
//! The read timestamp is derived: `rts = wts + delta`. Packing all three
//! fields into one word is a hard requirement - the commit protocol must be
//! able to observe and publish `(lock_bit, delta, wts)` as a unit with a
//! single compare-and-swap. The fields are never spread across separate
//! atomics.
//!
//! The same packing doubles as the on-disk tuple header, where bit 0 means
//! "this record carries only a timestamp refresh, no payload". See the
//! `tuple` module for the byte-level codec.
//!
//! # Atomicity
//!
//! [`AtomicTimestampWord`] wraps a 16-byte-aligned 128-bit atomic
//! (`portable-atomic`, native `cmpxchg16b`/CASP where the target has it).
//! All accesses are `Relaxed`: every correctness-critical load is either
//! followed by a CAS that republishes the observed value or guarded by the
//! storage engine's own synchronization.

use portable_atomic::{AtomicU128, Ordering};

/// Largest representable write timestamp (63 bits).
pub const MAX_WTS: u64 = (1 << 63) - 1;

const FLAG_MASK: u128 = 1;
const DELTA_SHIFT: u32 = 1;
const DELTA_MASK: u128 = (u64::MAX as u128) << DELTA_SHIFT;
const WTS_SHIFT: u32 = 65;

/// A packed `(lock_bit, delta, wts)` triple.
///
/// Plain value type; all mutation happens by building a new word and
/// publishing it through [`AtomicTimestampWord::compare_exchange`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampWord(u128);

impl TimestampWord {
    /// The all-zero word: unlocked, `wts = 0`, `delta = 0`.
    pub const ZERO: TimestampWord = TimestampWord(0);

    /// Pack a word from its three fields.
    ///
    /// `wts` is truncated to 63 bits; callers never reach that bound in
    /// practice (timestamps grow by small increments from zero).
    pub fn new(lock_bit: bool, delta: u64, wts: u64) -> Self {
        debug_assert!(wts <= MAX_WTS, "wts overflows 63 bits");
        let mut w = (lock_bit as u128) & FLAG_MASK;
        w |= (delta as u128) << DELTA_SHIFT;
        w |= ((wts & MAX_WTS) as u128) << WTS_SHIFT;
        TimestampWord(w)
    }

    /// Rebuild a word from its raw 128-bit representation.
    pub fn from_raw(raw: u128) -> Self {
        TimestampWord(raw)
    }

    /// The raw 128-bit representation.
    pub fn raw(self) -> u128 {
        self.0
    }

    /// The soft-lock flag (in memory) or the `is_ts_update` flag (on disk).
    pub fn lock_bit(self) -> bool {
        self.0 & FLAG_MASK != 0
    }

    /// Distance from `wts` to `rts`.
    pub fn delta(self) -> u64 {
        ((self.0 & DELTA_MASK) >> DELTA_SHIFT) as u64
    }

    /// Write timestamp of the current version.
    pub fn wts(self) -> u64 {
        (self.0 >> WTS_SHIFT) as u64
    }

    /// Read timestamp: the latest time at which this version is known valid.
    pub fn rts(self) -> u64 {
        self.wts().saturating_add(self.delta())
    }

    /// Copy of this word with the lock flag replaced.
    pub fn with_lock_bit(self, lock_bit: bool) -> Self {
        TimestampWord((self.0 & !FLAG_MASK) | (lock_bit as u128))
    }

    /// Copy of this word with `delta` replaced.
    pub fn with_delta(self, delta: u64) -> Self {
        TimestampWord((self.0 & !DELTA_MASK) | ((delta as u128) << DELTA_SHIFT))
    }

    /// Copy of this word with `wts` replaced.
    pub fn with_wts(self, wts: u64) -> Self {
        debug_assert!(wts <= MAX_WTS, "wts overflows 63 bits");
        let low = self.0 & (FLAG_MASK | DELTA_MASK);
        TimestampWord(low | (((wts & MAX_WTS) as u128) << WTS_SHIFT))
    }

    /// True when every field is zero.
    ///
    /// A zero word means "nothing observed yet": the cache cell was never
    /// seeded from storage and holds no validity interval worth persisting.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// A shared, 16-byte-aligned atomic cell holding one [`TimestampWord`].
///
/// This is the unit the timestamp cache hands out to transactions. The cell
/// outlives any single holder; shared ownership is managed by the cache's
/// per-entry refcount.
#[derive(Debug)]
pub struct AtomicTimestampWord {
    inner: AtomicU128,
}

impl AtomicTimestampWord {
    /// A fresh, all-zero cell.
    pub fn zero() -> Self {
        AtomicTimestampWord {
            inner: AtomicU128::new(0),
        }
    }

    /// Relaxed atomic load of the whole word.
    pub fn load(&self) -> TimestampWord {
        TimestampWord(self.inner.load(Ordering::Relaxed))
    }

    /// Relaxed 128-bit compare-and-swap.
    ///
    /// On failure the currently stored word is returned so the caller can
    /// retry without an extra load.
    pub fn compare_exchange(
        &self,
        current: TimestampWord,
        new: TimestampWord,
    ) -> Result<(), TimestampWord> {
        self.inner
            .compare_exchange(current.0, new.0, Ordering::Relaxed, Ordering::Relaxed)
            .map(|_| ())
            .map_err(TimestampWord)
    }

    /// Unconditional store. Only used when single ownership is guaranteed
    /// (cell construction), never on a shared cell.
    pub fn store(&self, word: TimestampWord) {
        self.inner.store(word.0, Ordering::Relaxed);
    }
}
