//! Error types for the control plane core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("tenant not found: {id}")]
    TenantNotFound { id: String },

    #[error("instance not found: {id}")]
    InstanceNotFound { id: String },

    #[error("tenant already exists: {id}")]
    TenantAlreadyExists { id: String },

    #[error("instance already exists: {id}")]
    InstanceAlreadyExists { id: String },

    #[error("source mapping already exists: {source_id}")]
    SourceMappingAlreadyExists { source_id: String },

    #[error("client id already bound: {client_id}")]
    ClientIdAlreadyBound { client_id: String },

    #[error("instance has no client credentials: {instance_id}")]
    CredentialsNotFound { instance_id: String },

    #[error("secret version not found: {version_id}")]
    SecretVersionNotFound { version_id: String },

    #[error("secret rotation already in progress for instance {instance_id}")]
    RotationAlreadyInProgress { instance_id: String },

    #[error("next secret version not adopted for instance {instance_id}")]
    SecretRotationNotAdopted { instance_id: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
