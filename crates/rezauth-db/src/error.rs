//! Database-specific error types and conversions.

use rezauth_core::error::CoreError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Snapshot codec error: {0}")]
    Codec(String),

    #[error("Concurrent snapshot modification for key {snapshot_key}")]
    WriteConflict { snapshot_key: String },
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        CoreError::Store(err.to_string())
    }
}
