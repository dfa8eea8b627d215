//! Rezilient auth control plane — storage.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Snapshot store implementations for the `rezauth-core` trait
//! - Error types ([`DbError`])

mod connection;
mod error;
mod schema;
pub mod store;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::run_migrations;
pub use store::{DEFAULT_SNAPSHOT_KEY, MemorySnapshotStore, SurrealSnapshotStore};
