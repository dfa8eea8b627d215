//! Enrollment service — one-time codes and the credential bootstrap.

use chrono::{DateTime, Duration, Utc};
use rezauth_core::clock::Clock;
use rezauth_core::crypto::{random_hex, random_token, sha256_hex};
use rezauth_core::error::{CoreError, CoreResult};
use rezauth_core::models::audit::{
    AuditEvent, AuditEventType, CreateAuditEvent, RedactionPolicy, metadata_value,
};
use rezauth_core::models::enrollment::EnrollmentCode;
use rezauth_core::models::instance::ClientCredentials;
use rezauth_core::models::reason::DenyReason;
use rezauth_core::models::snapshot::ControlPlaneSnapshot;
use rezauth_core::store::SnapshotStore;
use uuid::Uuid;

/// How many times client-id allocation retries on an index collision
/// before giving up.
const CLIENT_ID_ALLOCATION_ATTEMPTS: usize = 10;

/// Input for issuing a one-time enrollment code.
#[derive(Debug, Clone)]
pub struct IssueEnrollmentCode {
    pub tenant_id: String,
    pub instance_id: String,
    pub ttl_seconds: i64,
    pub requested_by: Option<String>,
}

/// A freshly issued code. The plaintext exists only in this value;
/// the store keeps its hash.
#[derive(Debug, Clone)]
pub struct IssuedEnrollmentCode {
    pub code_id: String,
    pub enrollment_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Credentials handed out by a successful exchange.
#[derive(Debug, Clone)]
pub struct EnrollmentGrant {
    pub tenant_id: String,
    pub instance_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub secret_version_id: String,
}

/// Outcome of an exchange attempt.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    Granted(EnrollmentGrant),
    Denied { reason_code: DenyReason },
}

/// Issues and exchanges one-time enrollment codes.
#[derive(Clone)]
pub struct Enrollment<S: SnapshotStore, C: Clock> {
    store: S,
    clock: C,
    policy: RedactionPolicy,
}

impl<S: SnapshotStore, C: Clock> Enrollment<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            policy: RedactionPolicy::default(),
        }
    }

    /// Issue a new code for a tenant-owned instance.
    ///
    /// The plaintext code is returned exactly once; only its SHA-256
    /// digest is persisted.
    pub async fn issue(&self, input: IssueEnrollmentCode) -> CoreResult<IssuedEnrollmentCode> {
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(input.ttl_seconds);
        let enrollment_code = format!("enroll_{}", random_token(24));
        let code_hash = sha256_hex(&enrollment_code);
        let code_id = format!("enr_{}", random_hex(8));

        self.store
            .mutate(|snap| {
                snap.tenant(&input.tenant_id)?;
                let instance = snap.instance(&input.instance_id)?;
                if instance.tenant_id != input.tenant_id {
                    return Err(CoreError::Validation {
                        message: format!(
                            "instance {} does not belong to tenant {}",
                            input.instance_id, input.tenant_id
                        ),
                    });
                }

                snap.enrollment_codes.insert(
                    code_id.clone(),
                    EnrollmentCode {
                        code_id: code_id.clone(),
                        code_hash: code_hash.clone(),
                        tenant_id: input.tenant_id.clone(),
                        instance_id: input.instance_id.clone(),
                        issued_at: now,
                        expires_at,
                        used_at: None,
                        issued_by: input.requested_by.clone(),
                    },
                );
                snap.code_hashes.insert(code_hash.clone(), code_id.clone());

                let mut event = CreateAuditEvent::new(AuditEventType::EnrollmentCodeIssued);
                event.actor = input.requested_by.clone();
                event.tenant_id = Some(input.tenant_id.clone());
                event.instance_id = Some(input.instance_id.clone());
                event.metadata.insert("code_id".into(), metadata_value(&code_id));
                event
                    .metadata
                    .insert("ttl_seconds".into(), metadata_value(&input.ttl_seconds));
                event
                    .metadata
                    .insert("expires_at".into(), metadata_value(&expires_at));
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
                Ok(())
            })
            .await?;

        Ok(IssuedEnrollmentCode {
            code_id,
            enrollment_code,
            expires_at,
        })
    }

    /// Exchange a plaintext code for an instance's initial credentials.
    ///
    /// Runs as a single transaction: two concurrent exchanges of the
    /// same code produce exactly one grant, the other is denied as
    /// used.
    pub async fn exchange(&self, enrollment_code: &str) -> CoreResult<ExchangeOutcome> {
        let now = self.clock.now();
        let supplied_hash = sha256_hex(enrollment_code);

        self.store
            .mutate(|snap| {
                let Some(code_id) = snap.code_hashes.get(&supplied_hash).cloned() else {
                    return Ok(self.deny(snap, DenyReason::DeniedInvalidEnrollmentCode, None, now));
                };
                let Some(code) = snap.enrollment_codes.get(&code_id).cloned() else {
                    return Ok(self.deny(snap, DenyReason::DeniedInvalidEnrollmentCode, None, now));
                };

                if code.used_at.is_some() {
                    return Ok(self.deny(
                        snap,
                        DenyReason::DeniedEnrollmentCodeUsed,
                        Some(&code),
                        now,
                    ));
                }
                // An instance that already holds credentials means a
                // concurrent exchange won the race; treat the code as
                // used regardless of its own marker.
                let instance = snap.instance(&code.instance_id)?;
                if instance.client_credentials.is_some() {
                    return Ok(self.deny(
                        snap,
                        DenyReason::DeniedEnrollmentCodeUsed,
                        Some(&code),
                        now,
                    ));
                }
                if now > code.expires_at {
                    return Ok(self.deny(
                        snap,
                        DenyReason::DeniedEnrollmentCodeExpired,
                        Some(&code),
                        now,
                    ));
                }

                // Allocate a globally unique client id, retrying on
                // index collisions.
                let mut client_id = None;
                for _ in 0..CLIENT_ID_ALLOCATION_ATTEMPTS {
                    let candidate = format!("cli_{}", random_hex(16));
                    if !snap.client_ids.contains_key(&candidate) {
                        client_id = Some(candidate);
                        break;
                    }
                }
                let client_id = client_id.ok_or_else(|| {
                    CoreError::Internal("client id allocation exhausted retries".into())
                })?;

                let client_secret = format!("sec_{}", random_token(32));
                let secret_version_id = "sv_1".to_string();

                let instance = snap.instance_mut(&code.instance_id)?;
                instance.client_credentials = Some(ClientCredentials::install(
                    client_id.clone(),
                    secret_version_id.clone(),
                    sha256_hex(&client_secret),
                    now,
                ));
                instance.updated_at = now;
                snap.client_ids
                    .insert(client_id.clone(), code.instance_id.clone());
                if let Some(stored) = snap.enrollment_codes.get_mut(&code_id) {
                    stored.used_at = Some(now);
                }

                let mut event = CreateAuditEvent::new(AuditEventType::EnrollmentCodeExchanged);
                event.tenant_id = Some(code.tenant_id.clone());
                event.instance_id = Some(code.instance_id.clone());
                event.client_id = Some(client_id.clone());
                event.metadata.insert("code_id".into(), metadata_value(&code_id));
                event
                    .metadata
                    .insert("secret_version_id".into(), metadata_value(&secret_version_id));
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));

                Ok(ExchangeOutcome::Granted(EnrollmentGrant {
                    tenant_id: code.tenant_id,
                    instance_id: code.instance_id,
                    client_id,
                    client_secret,
                    secret_version_id,
                }))
            })
            .await
    }

    fn deny(
        &self,
        snap: &mut ControlPlaneSnapshot,
        reason: DenyReason,
        code: Option<&EnrollmentCode>,
        now: DateTime<Utc>,
    ) -> ExchangeOutcome {
        let mut event = CreateAuditEvent::new(AuditEventType::TokenMintDenied);
        event.deny_reason = Some(reason);
        event.tenant_id = code.map(|c| c.tenant_id.clone());
        event.instance_id = code.map(|c| c.instance_id.clone());
        event
            .metadata
            .insert("phase".into(), metadata_value(&"enrollment_exchange"));
        snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
        ExchangeOutcome::Denied {
            reason_code: reason,
        }
    }
}
