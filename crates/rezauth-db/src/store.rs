//! Snapshot store implementations.

pub mod memory;
pub mod surreal;

pub use memory::MemorySnapshotStore;
pub use surreal::SurrealSnapshotStore;

/// Snapshot key used when a deployment hosts a single control plane.
pub const DEFAULT_SNAPSHOT_KEY: &str = "control-plane";
