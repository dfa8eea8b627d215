//! Reason codes and action verdicts carried in operation outcomes.
//!
//! The serialized (snake_case) forms of these enums are part of the
//! wire contract with both downstream services and the audit stream;
//! they must not change.

use serde::{Deserialize, Serialize};

/// Why a mint, validate, or enrollment exchange was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DeniedInvalidGrant,
    DeniedServiceNotAllowed,
    DeniedAuthControlPlaneOutage,
    DeniedInvalidClient,
    DeniedTenantSuspended,
    DeniedTenantDisabled,
    DeniedTenantNotEntitled,
    DeniedInstanceSuspended,
    DeniedInstanceDisabled,
    DeniedInvalidSecret,
    DeniedTokenMalformed,
    DeniedTokenInvalidSignature,
    DeniedTokenExpired,
    DeniedTokenWrongServiceScope,
    DeniedInvalidEnrollmentCode,
    DeniedEnrollmentCodeUsed,
    DeniedEnrollmentCodeExpired,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::DeniedInvalidGrant => "denied_invalid_grant",
            DenyReason::DeniedServiceNotAllowed => "denied_service_not_allowed",
            DenyReason::DeniedAuthControlPlaneOutage => "denied_auth_control_plane_outage",
            DenyReason::DeniedInvalidClient => "denied_invalid_client",
            DenyReason::DeniedTenantSuspended => "denied_tenant_suspended",
            DenyReason::DeniedTenantDisabled => "denied_tenant_disabled",
            DenyReason::DeniedTenantNotEntitled => "denied_tenant_not_entitled",
            DenyReason::DeniedInstanceSuspended => "denied_instance_suspended",
            DenyReason::DeniedInstanceDisabled => "denied_instance_disabled",
            DenyReason::DeniedInvalidSecret => "denied_invalid_secret",
            DenyReason::DeniedTokenMalformed => "denied_token_malformed",
            DenyReason::DeniedTokenInvalidSignature => "denied_token_invalid_signature",
            DenyReason::DeniedTokenExpired => "denied_token_expired",
            DenyReason::DeniedTokenWrongServiceScope => "denied_token_wrong_service_scope",
            DenyReason::DeniedInvalidEnrollmentCode => "denied_invalid_enrollment_code",
            DenyReason::DeniedEnrollmentCodeUsed => "denied_enrollment_code_used",
            DenyReason::DeniedEnrollmentCodeExpired => "denied_enrollment_code_expired",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why in-flight work is blocked or paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightReason {
    BlockedAuthControlPlaneOutage,
    PausedTokenRefreshGraceExhausted,
    PausedInstanceDisabled,
    PausedEntitlementDisabled,
}

impl InFlightReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InFlightReason::BlockedAuthControlPlaneOutage => "blocked_auth_control_plane_outage",
            InFlightReason::PausedTokenRefreshGraceExhausted => {
                "paused_token_refresh_grace_exhausted"
            }
            InFlightReason::PausedInstanceDisabled => "paused_instance_disabled",
            InFlightReason::PausedEntitlementDisabled => "paused_entitlement_disabled",
        }
    }
}

/// Verdict for a refresh attempt while the control plane is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshAction {
    RefreshAllowed,
    RetryWithinGrace,
    PauseInFlight,
}

/// Verdict for in-flight work given the owning tenant/instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightAction {
    Continue,
    Pause,
    ContinueUntilChunkBoundary,
}
