//! Audit event domain model and metadata sanitization.
//!
//! Events are append-only and never mutated after record. Each event is
//! also projected into a normalized cross-service form so downstream
//! consumers can replay one stream across services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::reason::{DenyReason, InFlightReason};
use crate::models::scope::ServiceScope;

/// Closed set of auditable operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TenantCreated,
    TenantStateChanged,
    TenantEntitlementChanged,
    InstanceCreated,
    InstanceStateChanged,
    InstanceAllowedServicesChanged,
    ClientCredentialsInstalled,
    EnrollmentCodeIssued,
    EnrollmentCodeExchanged,
    TokenMinted,
    TokenRefreshed,
    TokenMintDenied,
    TokenValidated,
    TokenValidateDenied,
    SecretRotationStarted,
    SecretRotationAdopted,
    SecretRotationCompleted,
    SecretRevoked,
    ControlPlaneOutageModeChanged,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::TenantCreated => "tenant_created",
            AuditEventType::TenantStateChanged => "tenant_state_changed",
            AuditEventType::TenantEntitlementChanged => "tenant_entitlement_changed",
            AuditEventType::InstanceCreated => "instance_created",
            AuditEventType::InstanceStateChanged => "instance_state_changed",
            AuditEventType::InstanceAllowedServicesChanged => "instance_allowed_services_changed",
            AuditEventType::ClientCredentialsInstalled => "client_credentials_installed",
            AuditEventType::EnrollmentCodeIssued => "enrollment_code_issued",
            AuditEventType::EnrollmentCodeExchanged => "enrollment_code_exchanged",
            AuditEventType::TokenMinted => "token_minted",
            AuditEventType::TokenRefreshed => "token_refreshed",
            AuditEventType::TokenMintDenied => "token_mint_denied",
            AuditEventType::TokenValidated => "token_validated",
            AuditEventType::TokenValidateDenied => "token_validate_denied",
            AuditEventType::SecretRotationStarted => "secret_rotation_started",
            AuditEventType::SecretRotationAdopted => "secret_rotation_adopted",
            AuditEventType::SecretRotationCompleted => "secret_rotation_completed",
            AuditEventType::SecretRevoked => "secret_revoked",
            AuditEventType::ControlPlaneOutageModeChanged => "control_plane_outage_mode_changed",
        }
    }
}

/// Replacement value for redacted metadata.
pub const REDACTED: &str = "[REDACTED]";

/// Which metadata keys get redacted.
///
/// A key is redacted when its lowercase form contains any of
/// `redact_substrings`, unless it ends with one of `allow_suffixes`
/// (identifiers such as `secret_version_id` name versions, not
/// secrets).
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    pub redact_substrings: Vec<String>,
    pub allow_suffixes: Vec<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            redact_substrings: vec![
                "secret".to_string(),
                "enrollment_code".to_string(),
                "token".to_string(),
            ],
            allow_suffixes: vec!["secret_version_id".to_string()],
        }
    }
}

impl RedactionPolicy {
    fn should_redact(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        if self.allow_suffixes.iter().any(|suffix| key.ends_with(suffix)) {
            return false;
        }
        self.redact_substrings.iter().any(|needle| key.contains(needle))
    }

    /// Recursively redact matching keys in a metadata map.
    pub fn sanitize(&self, metadata: Map<String, Value>) -> Map<String, Value> {
        metadata
            .into_iter()
            .map(|(key, value)| {
                if self.should_redact(&key) {
                    (key, Value::String(REDACTED.to_string()))
                } else {
                    (key, self.sanitize_value(value))
                }
            })
            .collect()
    }

    fn sanitize_value(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.sanitize(map)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.sanitize_value(v)).collect())
            }
            other => other,
        }
    }
}

/// Convert an arbitrary value into metadata, substituting the redaction
/// marker when it cannot be represented as JSON.
pub fn metadata_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(REDACTED.to_string()))
}

/// Fields supplied by the producer of an audit event. Identity and
/// timing are filled in at record time.
#[derive(Debug, Clone)]
pub struct CreateAuditEvent {
    pub event_type: AuditEventType,
    pub actor: Option<String>,
    pub tenant_id: Option<String>,
    pub instance_id: Option<String>,
    pub client_id: Option<String>,
    pub service_scope: Option<ServiceScope>,
    pub deny_reason: Option<DenyReason>,
    pub in_flight_reason: Option<InFlightReason>,
    pub metadata: Map<String, Value>,
}

impl CreateAuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            actor: None,
            tenant_id: None,
            instance_id: None,
            client_id: None,
            service_scope: None,
            deny_reason: None,
            in_flight_reason: None,
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: AuditEventType,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<String>,
    pub tenant_id: Option<String>,
    pub instance_id: Option<String>,
    pub client_id: Option<String>,
    pub service_scope: Option<ServiceScope>,
    pub deny_reason: Option<DenyReason>,
    pub in_flight_reason: Option<InFlightReason>,
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    /// Materialize an event: assign identity and time, sanitize metadata.
    pub fn record(
        input: CreateAuditEvent,
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        policy: &RedactionPolicy,
    ) -> Self {
        Self {
            event_id,
            event_type: input.event_type,
            occurred_at,
            actor: input.actor,
            tenant_id: input.tenant_id,
            instance_id: input.instance_id,
            client_id: input.client_id,
            service_scope: input.service_scope,
            deny_reason: input.deny_reason,
            in_flight_reason: input.in_flight_reason,
            metadata: policy.sanitize(input.metadata),
        }
    }

    /// Normalized projection for cross-service replay.
    pub fn to_cross_service(&self) -> CrossServiceEvent {
        let mut attributes = self.metadata.clone();
        if let Some(scope) = self.service_scope {
            attributes.insert("service_scope".to_string(), metadata_value(&scope));
        }
        if let Some(reason) = self.deny_reason {
            attributes.insert("deny_reason".to_string(), metadata_value(&reason));
        }
        if let Some(reason) = self.in_flight_reason {
            attributes.insert("in_flight_reason".to_string(), metadata_value(&reason));
        }
        CrossServiceEvent {
            event_id: self.event_id,
            kind: format!("auth.{}", self.event_type.as_str()),
            occurred_at: self.occurred_at,
            tenant_id: self.tenant_id.clone(),
            instance_id: self.instance_id.clone(),
            subject: self.client_id.clone(),
            attributes,
        }
    }
}

/// Cross-service event form, ordered for replay by
/// (`occurred_at`, `event_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossServiceEvent {
    pub event_id: Uuid,
    /// Namespaced type, e.g. `auth.token_minted`.
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub instance_id: Option<String>,
    /// Client identity where one was involved.
    pub subject: Option<String>,
    pub attributes: Map<String, Value>,
}
