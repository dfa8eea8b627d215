//! The single serializable unit of control-plane state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::audit::{AuditEvent, CrossServiceEvent};
use crate::models::enrollment::EnrollmentCode;
use crate::models::instance::Instance;
use crate::models::tenant::Tenant;

/// Complete control-plane state, persisted as one JSON document and
/// mutated only through the store's transactional `mutate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlaneSnapshot {
    pub tenants: BTreeMap<String, Tenant>,
    pub instances: BTreeMap<String, Instance>,
    /// `client_id` → `instance_id` reverse index.
    pub client_ids: BTreeMap<String, String>,
    pub enrollment_codes: BTreeMap<String, EnrollmentCode>,
    /// `code_hash` → `code_id` lookup index.
    pub code_hashes: BTreeMap<String, String>,
    pub audit_events: Vec<AuditEvent>,
    /// Normalized projection, appended in lockstep with `audit_events`.
    pub cross_service_events: Vec<CrossServiceEvent>,
    pub outage_active: bool,
}

impl ControlPlaneSnapshot {
    pub fn tenant(&self, tenant_id: &str) -> CoreResult<&Tenant> {
        self.tenants
            .get(tenant_id)
            .ok_or_else(|| CoreError::TenantNotFound {
                id: tenant_id.to_string(),
            })
    }

    pub fn tenant_mut(&mut self, tenant_id: &str) -> CoreResult<&mut Tenant> {
        self.tenants
            .get_mut(tenant_id)
            .ok_or_else(|| CoreError::TenantNotFound {
                id: tenant_id.to_string(),
            })
    }

    pub fn instance(&self, instance_id: &str) -> CoreResult<&Instance> {
        self.instances
            .get(instance_id)
            .ok_or_else(|| CoreError::InstanceNotFound {
                id: instance_id.to_string(),
            })
    }

    pub fn instance_mut(&mut self, instance_id: &str) -> CoreResult<&mut Instance> {
        self.instances
            .get_mut(instance_id)
            .ok_or_else(|| CoreError::InstanceNotFound {
                id: instance_id.to_string(),
            })
    }

    pub fn instance_by_client_id(&self, client_id: &str) -> Option<&Instance> {
        self.client_ids
            .get(client_id)
            .and_then(|instance_id| self.instances.get(instance_id))
    }

    pub fn source_exists(&self, source: &str) -> bool {
        self.instances.values().any(|i| i.source == source)
    }

    /// Append an event and its normalized projection together.
    pub fn append_audit(&mut self, event: AuditEvent) {
        self.cross_service_events.push(event.to_cross_service());
        self.audit_events.push(event);
    }
}
