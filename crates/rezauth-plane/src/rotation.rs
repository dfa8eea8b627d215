//! Rotation service — dual-secret overlap lifecycle.
//!
//! Per-credential state machine: stable → rotating (next secret issued)
//! → adopted (client proved it holds the next secret) → stable again
//! after promotion. Both secrets authenticate during the overlap
//! window.

use chrono::{DateTime, Duration, Utc};
use rezauth_core::clock::Clock;
use rezauth_core::crypto::{random_token, sha256_hex};
use rezauth_core::error::{CoreError, CoreResult};
use rezauth_core::models::audit::{
    AuditEvent, AuditEventType, CreateAuditEvent, RedactionPolicy, metadata_value,
};
use rezauth_core::models::instance::Instance;
use rezauth_core::store::SnapshotStore;
use uuid::Uuid;

/// Result of starting a rotation. `next_client_secret` exists only in
/// this value; the store keeps its hash.
#[derive(Debug, Clone)]
pub struct RotationStart {
    pub instance_id: String,
    pub next_secret_version_id: String,
    pub next_client_secret: String,
    pub overlap_expires_at: DateTime<Utc>,
}

/// Result of completing a rotation.
#[derive(Debug, Clone)]
pub struct RotationCompletion {
    pub instance: Instance,
    pub old_secret_version_id: String,
    pub new_secret_version_id: String,
}

/// Orchestrates the dual-secret rotation protocol.
#[derive(Clone)]
pub struct Rotation<S: SnapshotStore, C: Clock> {
    store: S,
    clock: C,
    policy: RedactionPolicy,
}

impl<S: SnapshotStore, C: Clock> Rotation<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            policy: RedactionPolicy::default(),
        }
    }

    /// Begin a rotation: allocate the next version, generate its
    /// secret, and open the overlap window.
    ///
    /// Preconditions are checked inside the transaction, so concurrent
    /// starts race deterministically and the loser fails with
    /// `RotationAlreadyInProgress`.
    pub async fn start(
        &self,
        instance_id: &str,
        overlap_seconds: i64,
        requested_by: Option<String>,
    ) -> CoreResult<RotationStart> {
        let now = self.clock.now();
        let overlap_expires_at = now + Duration::seconds(overlap_seconds);
        let next_client_secret = format!("sec_{}", random_token(32));
        let secret_hash = sha256_hex(&next_client_secret);

        self.store
            .mutate(|snap| {
                let instance = snap.instance_mut(instance_id)?;
                let credentials = instance.client_credentials.as_mut().ok_or_else(|| {
                    CoreError::CredentialsNotFound {
                        instance_id: instance_id.to_string(),
                    }
                })?;
                let version_id = credentials.allocate_version_id();
                credentials.add_next_version(
                    instance_id,
                    version_id.clone(),
                    secret_hash.clone(),
                    Some(overlap_expires_at),
                    now,
                )?;
                instance.updated_at = now;
                let tenant_id = instance.tenant_id.clone();
                let client_id = instance
                    .client_credentials
                    .as_ref()
                    .map(|c| c.client_id.clone());

                let mut event = CreateAuditEvent::new(AuditEventType::SecretRotationStarted);
                event.actor = requested_by.clone();
                event.tenant_id = Some(tenant_id);
                event.instance_id = Some(instance_id.to_string());
                event.client_id = client_id;
                event
                    .metadata
                    .insert("next_secret_version_id".into(), metadata_value(&version_id));
                event
                    .metadata
                    .insert("overlap_seconds".into(), metadata_value(&overlap_seconds));
                event.metadata.insert(
                    "overlap_expires_at".into(),
                    metadata_value(&overlap_expires_at),
                );
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));

                Ok(RotationStart {
                    instance_id: instance_id.to_string(),
                    next_secret_version_id: version_id,
                    next_client_secret: next_client_secret.clone(),
                    overlap_expires_at,
                })
            })
            .await
    }

    /// Record the first authenticated use of the next secret.
    /// Idempotent; only the first call changes state and emits audit.
    pub async fn record_adoption(&self, instance_id: &str, version_id: &str) -> CoreResult<()> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let instance = snap.instance_mut(instance_id)?;
                let credentials = instance.client_credentials.as_mut().ok_or_else(|| {
                    CoreError::CredentialsNotFound {
                        instance_id: instance_id.to_string(),
                    }
                })?;
                let newly_adopted = credentials.mark_adopted(version_id, now)?;
                if !newly_adopted {
                    return Ok(());
                }
                instance.updated_at = now;
                let tenant_id = instance.tenant_id.clone();
                let client_id = instance
                    .client_credentials
                    .as_ref()
                    .map(|c| c.client_id.clone());

                let mut event = CreateAuditEvent::new(AuditEventType::SecretRotationAdopted);
                event.tenant_id = Some(tenant_id);
                event.instance_id = Some(instance_id.to_string());
                event.client_id = client_id;
                event
                    .metadata
                    .insert("secret_version_id".into(), metadata_value(&version_id));
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
                Ok(())
            })
            .await
    }

    /// Promote the adopted next secret to current.
    pub async fn complete(
        &self,
        instance_id: &str,
        requested_by: Option<String>,
    ) -> CoreResult<RotationCompletion> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let instance = snap.instance_mut(instance_id)?;
                let credentials = instance.client_credentials.as_mut().ok_or_else(|| {
                    CoreError::CredentialsNotFound {
                        instance_id: instance_id.to_string(),
                    }
                })?;
                let (old_id, new_id) = credentials.promote_next(instance_id, now)?;
                instance.updated_at = now;
                let instance = instance.clone();

                let mut event = CreateAuditEvent::new(AuditEventType::SecretRotationCompleted);
                event.actor = requested_by.clone();
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event.client_id = instance
                    .client_credentials
                    .as_ref()
                    .map(|c| c.client_id.clone());
                event
                    .metadata
                    .insert("old_secret_version_id".into(), metadata_value(&old_id));
                event
                    .metadata
                    .insert("new_secret_version_id".into(), metadata_value(&new_id));
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));

                Ok(RotationCompletion {
                    instance,
                    old_secret_version_id: old_id,
                    new_secret_version_id: new_id,
                })
            })
            .await
    }

    /// Revoke a secret version out of band (compromise, abandoned
    /// rotation). Clears the next pointer when the revoked version was
    /// the next secret.
    pub async fn revoke(
        &self,
        instance_id: &str,
        version_id: &str,
        reason: Option<String>,
        requested_by: Option<String>,
    ) -> CoreResult<Instance> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let instance = snap.instance_mut(instance_id)?;
                let credentials = instance.client_credentials.as_mut().ok_or_else(|| {
                    CoreError::CredentialsNotFound {
                        instance_id: instance_id.to_string(),
                    }
                })?;
                credentials.revoke_version(version_id, now)?;
                instance.updated_at = now;
                let instance = instance.clone();

                let mut event = CreateAuditEvent::new(AuditEventType::SecretRevoked);
                event.actor = requested_by.clone();
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event.client_id = instance
                    .client_credentials
                    .as_ref()
                    .map(|c| c.client_id.clone());
                event
                    .metadata
                    .insert("secret_version_id".into(), metadata_value(&version_id));
                if let Some(reason) = &reason {
                    event.metadata.insert("reason".into(), metadata_value(reason));
                }
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
                Ok(instance)
            })
            .await
    }
}
