//! Core types for TempoDB
//!
//! This crate defines the foundational pieces shared by every layer:
//! - `TimestampWord` / `AtomicTimestampWord`: the packed 128-bit
//!   `{lock_bit, delta, wts}` word and its atomic cell
//! - Tuple codec: the 16-byte on-disk header wrapping every stored value
//! - `Message` / `MessageClass`: insert, update, and delete records
//! - `TupleMerge`: the compaction-time merge rules for timestamped records
//! - Traits: the `KvBackend` seam, the `MergeHooks` callbacks, and the
//!   application `ValueMerge` hook
//! - `TempoError`: the unified error type
//! - Isolation levels and size limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod isolation;
pub mod limits;
pub mod merge;
pub mod message;
pub mod timestamp;
pub mod traits;
pub mod tuple;

pub use error::{TempoError, TempoResult};
pub use isolation::IsolationLevel;
pub use limits::{validate_key, MAX_KEY_BYTES, MAX_RW_ENTRIES};
pub use merge::TupleMerge;
pub use message::{Message, MessageClass, MessageView};
pub use timestamp::{AtomicTimestampWord, TimestampWord, MAX_WTS};
pub use traits::{KvBackend, LastWriterWins, MergeHooks, ValueMerge};
