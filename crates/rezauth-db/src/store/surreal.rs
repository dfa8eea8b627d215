//! SurrealDB implementation of the snapshot store.
//!
//! One row per snapshot key in `control_plane_snapshot`, holding the
//! whole serialized snapshot plus a commit counter. A process-local
//! mutex serializes mutators (the control plane runs as a single
//! replica); the version-guarded UPDATE additionally rejects the commit
//! if another writer touched the row between read and write.

use std::sync::Arc;

use rezauth_core::error::{CoreError, CoreResult};
use rezauth_core::models::snapshot::ControlPlaneSnapshot;
use rezauth_core::store::SnapshotStore;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tokio::sync::Mutex;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SnapshotRow {
    version: u64,
    data: serde_json::Value,
}

/// SurrealDB-backed snapshot store.
pub struct SurrealSnapshotStore<C: Connection> {
    db: Surreal<C>,
    snapshot_key: String,
    write_lock: Arc<Mutex<()>>,
}

// The connection marker type itself does not need to be Clone.
impl<C: Connection> Clone for SurrealSnapshotStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            snapshot_key: self.snapshot_key.clone(),
            write_lock: self.write_lock.clone(),
        }
    }
}

impl<C: Connection> SurrealSnapshotStore<C> {
    pub fn new(db: Surreal<C>, snapshot_key: impl Into<String>) -> Self {
        Self {
            db,
            snapshot_key: snapshot_key.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load(&self) -> Result<Option<SnapshotRow>, DbError> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('control_plane_snapshot', $key)")
            .bind(("key", self.snapshot_key.clone()))
            .await?;
        let rows: Vec<SnapshotRow> = result.take(0)?;
        Ok(rows.into_iter().next())
    }

    fn decode(row: &SnapshotRow) -> Result<ControlPlaneSnapshot, DbError> {
        serde_json::from_value(row.data.clone())
            .map_err(|e| DbError::Codec(format!("snapshot decode: {e}")))
    }

    fn encode(snapshot: &ControlPlaneSnapshot) -> Result<serde_json::Value, DbError> {
        serde_json::to_value(snapshot).map_err(|e| DbError::Codec(format!("snapshot encode: {e}")))
    }

    async fn commit(
        &self,
        existed: bool,
        expected_version: u64,
        snapshot: &ControlPlaneSnapshot,
    ) -> Result<(), DbError> {
        let data = Self::encode(snapshot)?;
        if existed {
            let mut result = self
                .db
                .query(
                    "UPDATE type::record('control_plane_snapshot', $key) SET \
                     version = $next, data = $data, updated_at = time::now() \
                     WHERE version = $expected",
                )
                .bind(("key", self.snapshot_key.clone()))
                .bind(("next", expected_version + 1))
                .bind(("expected", expected_version))
                .bind(("data", data))
                .await?;
            let rows: Vec<SnapshotRow> = result.take(0)?;
            if rows.is_empty() {
                return Err(DbError::WriteConflict {
                    snapshot_key: self.snapshot_key.clone(),
                });
            }
        } else {
            self.db
                .query(
                    "CREATE type::record('control_plane_snapshot', $key) SET \
                     snapshot_key = $key, version = 1, data = $data",
                )
                .bind(("key", self.snapshot_key.clone()))
                .bind(("data", data))
                .await?
                .check()
                .map_err(|e| DbError::Migration(e.to_string()))?;
        }
        Ok(())
    }
}

impl<C: Connection> SnapshotStore for SurrealSnapshotStore<C> {
    async fn read(&self) -> CoreResult<ControlPlaneSnapshot> {
        match self.load().await.map_err(CoreError::from)? {
            Some(row) => Ok(Self::decode(&row).map_err(CoreError::from)?),
            None => Ok(ControlPlaneSnapshot::default()),
        }
    }

    async fn mutate<T, F>(&self, f: F) -> CoreResult<T>
    where
        T: Send,
        F: FnOnce(&mut ControlPlaneSnapshot) -> Result<T, CoreError> + Send,
    {
        let _guard = self.write_lock.lock().await;

        let row = self.load().await.map_err(CoreError::from)?;
        let (existed, expected_version, mut working) = match &row {
            Some(row) => (true, row.version, Self::decode(row).map_err(CoreError::from)?),
            None => (false, 0, ControlPlaneSnapshot::default()),
        };

        // The closure runs against a working copy; an error here leaves
        // the persisted row untouched.
        let value = f(&mut working)?;

        self.commit(existed, expected_version, &working)
            .await
            .map_err(CoreError::from)?;
        Ok(value)
    }

    async fn version(&self) -> CoreResult<u64> {
        Ok(self
            .load()
            .await
            .map_err(CoreError::from)?
            .map(|row| row.version)
            .unwrap_or(0))
    }
}
