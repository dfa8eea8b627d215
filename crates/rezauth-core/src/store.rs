//! Store trait for the control-plane snapshot.
//!
//! The store is the single async boundary of the system: every state
//! change goes through [`SnapshotStore::mutate`], which serializes
//! mutators and commits all-or-nothing.

use crate::error::{CoreError, CoreResult};
use crate::models::snapshot::ControlPlaneSnapshot;

/// Durable, serializable access to one control-plane snapshot.
///
/// Contract:
/// - `read` returns an owned copy; callers can never mutate shared
///   state through it.
/// - `mutate` runs the closure against the current snapshot under a
///   lock. On `Ok` the new snapshot is committed with `version + 1`;
///   on `Err` nothing is persisted and the error is returned. Mutators
///   across concurrent callers are totally ordered.
/// - Closures must stay cheap and may be re-invoked by callers after an
///   aborted transaction, so they should be idempotent.
pub trait SnapshotStore: Send + Sync {
    fn read(&self) -> impl Future<Output = CoreResult<ControlPlaneSnapshot>> + Send;

    fn mutate<T, F>(&self, f: F) -> impl Future<Output = CoreResult<T>> + Send
    where
        T: Send,
        F: FnOnce(&mut ControlPlaneSnapshot) -> Result<T, CoreError> + Send;

    /// Commit counter, for observability.
    fn version(&self) -> impl Future<Output = CoreResult<u64>> + Send;
}
