//! Registry service — tenant, instance, and credential lifecycle.
//!
//! Every mutation runs inside a single store transaction and appends
//! exactly one audit event in the same transaction, so state and audit
//! can never diverge.

use chrono::{DateTime, Utc};
use rezauth_core::clock::Clock;
use rezauth_core::error::{CoreError, CoreResult};
use rezauth_core::models::audit::{
    AuditEvent, AuditEventType, CreateAuditEvent, RedactionPolicy, metadata_value,
};
use rezauth_core::models::instance::{
    ClientCredentials, CreateInstance, Instance, normalize_services,
};
use rezauth_core::models::scope::ServiceScope;
use rezauth_core::models::snapshot::ControlPlaneSnapshot;
use rezauth_core::models::tenant::{CreateTenant, LifecycleState, Tenant};
use rezauth_core::store::SnapshotStore;
use uuid::Uuid;

/// Result of promoting the next secret version.
#[derive(Debug, Clone)]
pub struct PromotionOutput {
    pub instance: Instance,
    pub old_secret_version_id: String,
    pub new_secret_version_id: String,
}

/// Tenant/instance/credential registry over the snapshot store.
#[derive(Clone)]
pub struct Registry<S: SnapshotStore, C: Clock> {
    store: S,
    clock: C,
    policy: RedactionPolicy,
}

impl<S: SnapshotStore, C: Clock> Registry<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            policy: RedactionPolicy::default(),
        }
    }

    fn audit(&self, snap: &mut ControlPlaneSnapshot, input: CreateAuditEvent, now: DateTime<Utc>) {
        snap.append_audit(AuditEvent::record(input, Uuid::new_v4(), now, &self.policy));
    }

    // -------------------------------------------------------------------
    // Tenants
    // -------------------------------------------------------------------

    pub async fn create_tenant(&self, input: CreateTenant) -> CoreResult<Tenant> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                if snap.tenants.contains_key(&input.tenant_id) {
                    return Err(CoreError::TenantAlreadyExists {
                        id: input.tenant_id.clone(),
                    });
                }
                let tenant = Tenant {
                    tenant_id: input.tenant_id.clone(),
                    name: input.name.clone(),
                    state: input.state.unwrap_or(LifecycleState::Active),
                    entitlement_state: input.entitlement_state.unwrap_or(LifecycleState::Active),
                    created_at: now,
                    updated_at: now,
                };
                snap.tenants.insert(tenant.tenant_id.clone(), tenant.clone());

                let mut event = CreateAuditEvent::new(AuditEventType::TenantCreated);
                event.actor = input.actor.clone();
                event.tenant_id = Some(tenant.tenant_id.clone());
                event.metadata.insert("name".into(), metadata_value(&tenant.name));
                event.metadata.insert("state".into(), metadata_value(&tenant.state));
                event.metadata.insert(
                    "entitlement_state".into(),
                    metadata_value(&tenant.entitlement_state),
                );
                self.audit(snap, event, now);
                Ok(tenant)
            })
            .await
    }

    pub async fn set_tenant_state(
        &self,
        tenant_id: &str,
        new_state: LifecycleState,
        actor: Option<String>,
    ) -> CoreResult<Tenant> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let tenant = snap.tenant_mut(tenant_id)?;
                let previous = tenant.state;
                tenant.state = new_state;
                tenant.updated_at = now;
                let tenant = tenant.clone();

                let mut event = CreateAuditEvent::new(AuditEventType::TenantStateChanged);
                event.actor = actor.clone();
                event.tenant_id = Some(tenant.tenant_id.clone());
                event.metadata.insert("previous_state".into(), metadata_value(&previous));
                event.metadata.insert("new_state".into(), metadata_value(&new_state));
                self.audit(snap, event, now);
                Ok(tenant)
            })
            .await
    }

    pub async fn set_tenant_entitlement(
        &self,
        tenant_id: &str,
        new_state: LifecycleState,
        actor: Option<String>,
    ) -> CoreResult<Tenant> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let tenant = snap.tenant_mut(tenant_id)?;
                let previous = tenant.entitlement_state;
                tenant.entitlement_state = new_state;
                tenant.updated_at = now;
                let tenant = tenant.clone();

                let mut event = CreateAuditEvent::new(AuditEventType::TenantEntitlementChanged);
                event.actor = actor.clone();
                event.tenant_id = Some(tenant.tenant_id.clone());
                event
                    .metadata
                    .insert("previous_entitlement_state".into(), metadata_value(&previous));
                event
                    .metadata
                    .insert("new_entitlement_state".into(), metadata_value(&new_state));
                self.audit(snap, event, now);
                Ok(tenant)
            })
            .await
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> CoreResult<Tenant> {
        let snapshot = self.store.read().await?;
        snapshot.tenant(tenant_id).cloned()
    }

    pub async fn list_tenants(&self) -> CoreResult<Vec<Tenant>> {
        let snapshot = self.store.read().await?;
        Ok(snapshot.tenants.values().cloned().collect())
    }

    // -------------------------------------------------------------------
    // Instances
    // -------------------------------------------------------------------

    pub async fn create_instance(&self, input: CreateInstance) -> CoreResult<Instance> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                snap.tenant(&input.tenant_id)?;
                if snap.instances.contains_key(&input.instance_id) {
                    return Err(CoreError::InstanceAlreadyExists {
                        id: input.instance_id.clone(),
                    });
                }
                if snap.source_exists(&input.source) {
                    return Err(CoreError::SourceMappingAlreadyExists {
                        source_id: input.source.clone(),
                    });
                }
                let allowed_services = normalize_services(
                    input.allowed_services.clone().unwrap_or_else(ServiceScope::all),
                );
                if allowed_services.is_empty() {
                    return Err(CoreError::Validation {
                        message: "allowed_services must not be empty".into(),
                    });
                }
                let instance = Instance {
                    instance_id: input.instance_id.clone(),
                    tenant_id: input.tenant_id.clone(),
                    source: input.source.clone(),
                    state: input.state.unwrap_or(LifecycleState::Active),
                    allowed_services,
                    client_credentials: None,
                    created_at: now,
                    updated_at: now,
                };
                snap.instances
                    .insert(instance.instance_id.clone(), instance.clone());

                let mut event = CreateAuditEvent::new(AuditEventType::InstanceCreated);
                event.actor = input.actor.clone();
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event.metadata.insert("source".into(), metadata_value(&instance.source));
                event.metadata.insert("state".into(), metadata_value(&instance.state));
                event.metadata.insert(
                    "allowed_services".into(),
                    metadata_value(&instance.allowed_services),
                );
                self.audit(snap, event, now);
                Ok(instance)
            })
            .await
    }

    pub async fn set_instance_state(
        &self,
        instance_id: &str,
        new_state: LifecycleState,
        actor: Option<String>,
    ) -> CoreResult<Instance> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let instance = snap.instance_mut(instance_id)?;
                let previous = instance.state;
                instance.state = new_state;
                instance.updated_at = now;
                let instance = instance.clone();

                let mut event = CreateAuditEvent::new(AuditEventType::InstanceStateChanged);
                event.actor = actor.clone();
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event.metadata.insert("previous_state".into(), metadata_value(&previous));
                event.metadata.insert("new_state".into(), metadata_value(&new_state));
                self.audit(snap, event, now);
                Ok(instance)
            })
            .await
    }

    pub async fn set_instance_allowed_services(
        &self,
        instance_id: &str,
        services: Vec<ServiceScope>,
        actor: Option<String>,
    ) -> CoreResult<Instance> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                let services = normalize_services(services.clone());
                if services.is_empty() {
                    return Err(CoreError::Validation {
                        message: "allowed_services must not be empty".into(),
                    });
                }
                let instance = snap.instance_mut(instance_id)?;
                let previous = instance.allowed_services.clone();
                instance.allowed_services = services;
                instance.updated_at = now;
                let instance = instance.clone();

                let mut event =
                    CreateAuditEvent::new(AuditEventType::InstanceAllowedServicesChanged);
                event.actor = actor.clone();
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event
                    .metadata
                    .insert("previous_allowed_services".into(), metadata_value(&previous));
                event.metadata.insert(
                    "new_allowed_services".into(),
                    metadata_value(&instance.allowed_services),
                );
                self.audit(snap, event, now);
                Ok(instance)
            })
            .await
    }

    pub async fn get_instance(&self, instance_id: &str) -> CoreResult<Instance> {
        let snapshot = self.store.read().await?;
        snapshot.instance(instance_id).cloned()
    }

    pub async fn get_instance_by_client_id(&self, client_id: &str) -> CoreResult<Option<Instance>> {
        let snapshot = self.store.read().await?;
        Ok(snapshot.instance_by_client_id(client_id).cloned())
    }

    pub async fn list_instances(&self, tenant_id: Option<&str>) -> CoreResult<Vec<Instance>> {
        let snapshot = self.store.read().await?;
        Ok(snapshot
            .instances
            .values()
            .filter(|i| tenant_id.is_none_or(|t| i.tenant_id == t))
            .cloned()
            .collect())
    }

    // -------------------------------------------------------------------
    // Credentials
    // -------------------------------------------------------------------

    /// Install the first credential set on an instance.
    ///
    /// Fails when the client id is bound to another instance, or when
    /// the instance already carries credentials under a different
    /// client id.
    pub async fn set_initial_credentials(
        &self,
        instance_id: &str,
        client_id: &str,
        version_id: &str,
        secret_hash: &str,
    ) -> CoreResult<Instance> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                if let Some(bound_instance) = snap.client_ids.get(client_id)
                    && bound_instance != instance_id
                {
                    return Err(CoreError::ClientIdAlreadyBound {
                        client_id: client_id.to_string(),
                    });
                }
                let instance = snap.instance_mut(instance_id)?;
                if let Some(existing) = &instance.client_credentials
                    && existing.client_id != client_id
                {
                    return Err(CoreError::Validation {
                        message: format!(
                            "instance {instance_id} already has credentials for another client"
                        ),
                    });
                }
                instance.client_credentials = Some(ClientCredentials::install(
                    client_id.to_string(),
                    version_id.to_string(),
                    secret_hash.to_string(),
                    now,
                ));
                instance.updated_at = now;
                let instance = instance.clone();
                snap.client_ids
                    .insert(client_id.to_string(), instance_id.to_string());

                let mut event = CreateAuditEvent::new(AuditEventType::ClientCredentialsInstalled);
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event.client_id = Some(client_id.to_string());
                event
                    .metadata
                    .insert("secret_version_id".into(), metadata_value(&version_id));
                self.audit(snap, event, now);
                Ok(instance)
            })
            .await
    }

    /// Append a new secret version and point `next` at it.
    pub async fn add_next_secret_version(
        &self,
        instance_id: &str,
        version_id: &str,
        secret_hash: &str,
        valid_until: Option<DateTime<Utc>>,
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
                credentials.add_next_version(
                    instance_id,
                    version_id.to_string(),
                    secret_hash.to_string(),
                    valid_until,
                    now,
                )?;
                instance.updated_at = now;
                let instance = instance.clone();

                let mut event = CreateAuditEvent::new(AuditEventType::SecretRotationStarted);
                event.tenant_id = Some(instance.tenant_id.clone());
                event.instance_id = Some(instance.instance_id.clone());
                event.client_id = instance
                    .client_credentials
                    .as_ref()
                    .map(|c| c.client_id.clone());
                event
                    .metadata
                    .insert("next_secret_version_id".into(), metadata_value(&version_id));
                if let Some(valid_until) = valid_until {
                    event
                        .metadata
                        .insert("overlap_expires_at".into(), metadata_value(&valid_until));
                }
                self.audit(snap, event, now);
                Ok(instance)
            })
            .await
    }

    /// Record adoption of a secret version. Idempotent: repeat calls
    /// change nothing and emit nothing.
    pub async fn mark_secret_adopted(
        &self,
        instance_id: &str,
        version_id: &str,
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
                let newly_adopted = credentials.mark_adopted(version_id, now)?;
                if newly_adopted {
                    instance.updated_at = now;
                }
                let instance = instance.clone();

                if newly_adopted {
                    let mut event = CreateAuditEvent::new(AuditEventType::SecretRotationAdopted);
                    event.tenant_id = Some(instance.tenant_id.clone());
                    event.instance_id = Some(instance.instance_id.clone());
                    event.client_id = instance
                        .client_credentials
                        .as_ref()
                        .map(|c| c.client_id.clone());
                    event
                        .metadata
                        .insert("secret_version_id".into(), metadata_value(&version_id));
                    self.audit(snap, event, now);
                }
                Ok(instance)
            })
            .await
    }

    /// Promote the adopted next version: revoke the old current, clear
    /// the overlap deadline, and move the pointers.
    pub async fn promote_next_secret(&self, instance_id: &str) -> CoreResult<PromotionOutput> {
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
                self.audit(snap, event, now);
                Ok(PromotionOutput {
                    instance,
                    old_secret_version_id: old_id,
                    new_secret_version_id: new_id,
                })
            })
            .await
    }

    /// Revoke a secret version; clears the next pointer when the
    /// revoked version was the next secret.
    pub async fn revoke_secret_version(
        &self,
        instance_id: &str,
        version_id: &str,
        reason: Option<String>,
        actor: Option<String>,
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
                event.actor = actor.clone();
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
                self.audit(snap, event, now);
                Ok(instance)
            })
            .await
    }
}
