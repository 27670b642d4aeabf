//! Engine layer for TempoDB
//!
//! Wires the storage collaborator and the concurrency layer into the
//! handle applications use: [`TransactionalDb`] plus its
//! [`TransactionalConfig`]. See the workspace root crate for the public
//! facade.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod database;

pub use config::TransactionalConfig;
pub use database::TransactionalDb;

// Re-export the handle's companion types so callers need one import path.
pub use tempo_concurrency::{LookupResult, Transaction};
pub use tempo_core::{IsolationLevel, TempoError, TempoResult};
pub use tempo_core::{LastWriterWins, ValueMerge};
