//! Rezilient auth control plane — core domain.
//!
//! This crate holds the registry data model and its invariants, the
//! clock and crypto primitives, and the snapshot store contract. It has
//! no I/O of its own; durable storage lives in `rezauth-db` and the
//! policy services in `rezauth-plane`.

pub mod clock;
pub mod crypto;
pub mod error;
pub mod models;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use store::SnapshotStore;
