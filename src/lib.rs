//! # TempoDB
//!
//! Serializable optimistic transactions over an embeddable key-value
//! engine - no read locks, no lock manager, no global clock.
//!
//! TempoDB layers a timestamp-ordered optimistic concurrency protocol on a
//! log-structured key-value store. Every stored value carries a validity
//! interval `[wts, rts]` in a 16-byte tuple header; an in-memory timestamp
//! cache doubles as a soft lock table, and commit timestamps are derived
//! entirely from the intervals a transaction observed.
//!
//! # Quick Start
//!
//! ```
//! use tempodb::{Transaction, TransactionalConfig, TransactionalDb};
//!
//! let db = TransactionalDb::create(TransactionalConfig::default());
//! db.register_thread();
//!
//! let mut txn = Transaction::new();
//! db.begin(&mut txn).unwrap();
//! db.insert(&mut txn, b"user:name", b"Alice").unwrap();
//! let commit_ts = db.commit(&mut txn).unwrap();
//! assert!(commit_ts >= 1);
//!
//! db.begin(&mut txn).unwrap();
//! assert_eq!(db.get(&mut txn, b"user:name").unwrap().as_deref(), Some(&b"Alice"[..]));
//! db.abort(&mut txn).unwrap();
//! ```
//!
//! # Handling conflicts
//!
//! Commit returns a retryable error when validation fails; the idiomatic
//! caller loops:
//!
//! ```
//! use tempodb::{TempoError, Transaction, TransactionalConfig, TransactionalDb};
//!
//! let db = TransactionalDb::create(TransactionalConfig::default());
//! db.register_thread();
//! let mut txn = Transaction::new();
//!
//! loop {
//!     db.begin(&mut txn).unwrap();
//!     let current = db.get(&mut txn, b"counter").unwrap()
//!         .map(|v| u64::from_le_bytes(v.try_into().unwrap()))
//!         .unwrap_or(0);
//!     db.insert(&mut txn, b"counter", &(current + 1).to_le_bytes()).unwrap();
//!     match db.commit(&mut txn) {
//!         Ok(_) => break,
//!         Err(e) if e.is_retryable() => continue,
//!         Err(e) => panic!("{e}"),
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `tempo-core` | Timestamp words, tuple codec, merge rules, errors |
//! | `tempo-storage` | In-memory message-folding key-value engine |
//! | `tempo-concurrency` | Timestamp cache, read/write sets, commit protocol |
//! | `tempo-engine` | The `TransactionalDb` handle and its configuration |
//!
//! Only the surface re-exported here is considered stable.

// Re-export the public API from tempo-engine.
pub use tempo_engine::*;
