//! Rezilient auth control plane — application entry point.

use rezauth_core::clock::SystemClock;
use rezauth_core::store::SnapshotStore;
use rezauth_db::{DEFAULT_SNAPSHOT_KEY, DbConfig, DbManager};
use rezauth_plane::{AuditRecorder, Enrollment, Registry, Rotation, TokenConfig, TokenService};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rezauth=info".parse().unwrap()),
        )
        .json()
        .init();

    tracing::info!("Starting rezauth control plane...");

    // Fail fast on a missing or weak signing key before touching the
    // store.
    let token_config = TokenConfig {
        signing_key: std::env::var("REZAUTH_SIGNING_KEY").unwrap_or_default(),
        ..TokenConfig::default()
    };
    if let Err(err) = token_config.validate() {
        tracing::error!(error = %err, "REZAUTH_SIGNING_KEY is missing or too short");
        return;
    }

    let manager = match DbManager::connect(&DbConfig::default()).await {
        Ok(manager) => manager,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect the snapshot store");
            return;
        }
    };
    let store = manager.snapshot_store(DEFAULT_SNAPSHOT_KEY);
    match store.version().await {
        Ok(version) => tracing::info!(version, "snapshot store ready"),
        Err(err) => {
            tracing::error!(error = %err, "failed to read the snapshot");
            return;
        }
    }

    let clock = SystemClock;
    let _registry = Registry::new(store.clone(), clock);
    let _enrollment = Enrollment::new(store.clone(), clock);
    let _rotation = Rotation::new(store.clone(), clock);
    let _audit = AuditRecorder::new(store.clone(), clock);
    let _tokens = match TokenService::new(token_config, store, clock) {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::error!(error = %err, "invalid token configuration");
            return;
        }
    };
    tracing::info!("control plane services initialized");

    // TODO: Start the HTTP API server over these services

    tracing::info!("rezauth control plane stopped.");
}
