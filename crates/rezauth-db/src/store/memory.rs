//! In-memory implementation of the snapshot store.
//!
//! Holds the snapshot behind a single async mutex: mutators serialize,
//! and the working copy only replaces the committed state when the
//! closure succeeds. Not durable; intended for tests and local
//! development.

use std::sync::Arc;

use rezauth_core::error::{CoreError, CoreResult};
use rezauth_core::models::snapshot::ControlPlaneSnapshot;
use rezauth_core::store::SnapshotStore;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Versioned {
    version: u64,
    snapshot: ControlPlaneSnapshot,
}

/// In-memory snapshot store.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<Versioned>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self) -> CoreResult<ControlPlaneSnapshot> {
        Ok(self.inner.lock().await.snapshot.clone())
    }

    async fn mutate<T, F>(&self, f: F) -> CoreResult<T>
    where
        T: Send,
        F: FnOnce(&mut ControlPlaneSnapshot) -> Result<T, CoreError> + Send,
    {
        let mut state = self.inner.lock().await;
        // Work on a copy so a failing closure cannot leave partial
        // writes behind.
        let mut working = state.snapshot.clone();
        let value = f(&mut working)?;
        state.snapshot = working;
        state.version += 1;
        Ok(value)
    }

    async fn version(&self) -> CoreResult<u64> {
        Ok(self.inner.lock().await.version)
    }
}
