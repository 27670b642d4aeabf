//! Concurrency layer for TempoDB
//!
//! This crate implements optimistic concurrency control over a key-value
//! engine, with:
//! - `TimestampCache`: the bounded, refcounted soft lock table mapping keys
//!   to shared 128-bit timestamp cells
//! - `ReadWriteSet` / `RwEntry`: per-transaction operation tracking
//! - `Transaction` / `LookupResult`: the caller-owned handle and read buffer
//! - `TransactionManager`: the operations and the timestamp-ordered commit
//!   protocol (sort, lock no-wait, validate, install, release)
//!
//! Reads never block on other transactions, writes never wait on locks, and
//! the commit timestamp is derived purely from observed per-key timestamps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod rwset;
pub mod transaction;
pub mod tscache;

pub use manager::{ManagerOptions, TransactionManager};
pub use rwset::{ReadWriteSet, RwEntry};
pub use transaction::{LookupResult, Transaction};
pub use tscache::{SharedCell, TimestampCache};
