//! SurrealDB connection management.
//!
//! A [`DbManager`] owns one SurrealDB client with the snapshot schema
//! applied and hands out [`SurrealSnapshotStore`]s bound to it.
//! Production connects over WebSocket; tests and local development run
//! the embedded in-memory engine through the same surface.

use surrealdb::engine::local::{Db, Mem};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::{Connection, Surreal};
use tracing::info;

use crate::error::DbError;
use crate::schema::run_migrations;
use crate::store::SurrealSnapshotStore;

/// Connection settings for the durable snapshot store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root username for authentication.
    pub username: String,
    /// Root password for authentication.
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "rezauth".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// A connected SurrealDB client, migrated and ready to back snapshot
/// stores.
pub struct DbManager<C: Connection> {
    db: Surreal<C>,
}

impl DbManager<Client> {
    /// Connect over WebSocket, authenticate as root, select the
    /// configured namespace and database, and apply pending snapshot
    /// migrations.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        run_migrations(&db).await?;

        info!("Snapshot store connected and migrated");

        Ok(Self { db })
    }
}

impl DbManager<Db> {
    /// Start an embedded in-memory engine behind the same manager
    /// surface. State dies with the process.
    pub async fn connect_embedded() -> Result<Self, DbError> {
        let config = DbConfig::default();
        let db = Surreal::new::<Mem>(()).await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;
        run_migrations(&db).await?;
        Ok(Self { db })
    }
}

impl<C: Connection> DbManager<C> {
    /// A snapshot store bound to this connection.
    pub fn snapshot_store(&self, snapshot_key: impl Into<String>) -> SurrealSnapshotStore<C> {
        SurrealSnapshotStore::new(self.db.clone(), snapshot_key)
    }

    /// Returns a reference to the underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }
}
