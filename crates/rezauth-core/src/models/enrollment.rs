//! Enrollment code domain model.
//!
//! A one-time code bootstraps an instance's credentials. The plaintext
//! leaves the control plane exactly once, at issue time; only its
//! SHA-256 hex digest is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentCode {
    /// `enr_<rand>`.
    pub code_id: String,
    /// SHA-256 hex of the plaintext code; the only persisted material.
    pub code_hash: String,
    pub tenant_id: String,
    pub instance_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set at most once, on successful exchange.
    pub used_at: Option<DateTime<Utc>>,
    pub issued_by: Option<String>,
}
