//! Tenant domain model.
//!
//! A tenant is a customer account. Tenants are created by admin action,
//! mutated only through state and entitlement transitions, and never
//! destroyed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by tenants (account and entitlement) and
/// instances. Transitions are unrestricted within the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Suspended,
    Disabled,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Suspended => "suspended",
            LifecycleState::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    /// Human-readable name.
    pub name: String,
    pub state: LifecycleState,
    /// Commercial entitlement, tracked separately from the account state.
    pub entitlement_state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new tenant.
#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub tenant_id: String,
    pub name: String,
    /// Defaults to `active`.
    pub state: Option<LifecycleState>,
    /// Defaults to `active`.
    pub entitlement_state: Option<LifecycleState>,
    pub actor: Option<String>,
}
