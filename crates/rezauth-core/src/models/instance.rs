//! Instance and client-credential domain models.
//!
//! An instance is one enrolled customer deployment, owned by exactly one
//! tenant. Its credentials carry an ordered list of secret versions; the
//! dual-secret rotation protocol moves the `current`/`next` pointers
//! across that list without ever invalidating both secrets at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{CoreError, CoreResult};
use crate::models::scope::ServiceScope;
use crate::models::tenant::LifecycleState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    /// Owning tenant; must refer to an existing tenant.
    pub tenant_id: String,
    /// External origin identifier, globally unique across all instances.
    pub source: String,
    pub state: LifecycleState,
    /// Sorted, deduplicated, never empty after create.
    pub allowed_services: Vec<ServiceScope>,
    pub client_credentials: Option<ClientCredentials>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new instance.
#[derive(Debug, Clone)]
pub struct CreateInstance {
    pub instance_id: String,
    pub tenant_id: String,
    pub source: String,
    /// Defaults to `active`.
    pub state: Option<LifecycleState>,
    /// Defaults to the full service set.
    pub allowed_services: Option<Vec<ServiceScope>>,
    pub actor: Option<String>,
}

/// Sort and deduplicate a service list.
pub fn normalize_services(mut services: Vec<ServiceScope>) -> Vec<ServiceScope> {
    services.sort();
    services.dedup();
    services
}

/// One version of a client secret. The raw secret is never persisted;
/// only its SHA-256 hex digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretVersion {
    /// `sv_<N>`; N is monotonic within the credential's history.
    pub version_id: String,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    /// First successful authenticated use of this version as the next
    /// secret. Set exactly once.
    pub adopted_at: Option<DateTime<Utc>>,
    /// Once set, never cleared.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Overlap deadline while this version is the next secret. Cleared
    /// on promotion.
    pub valid_until: Option<DateTime<Utc>>,
}

/// A matched secret version from [`ClientCredentials::match_secret`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMatch {
    pub version_id: String,
    pub is_next_version: bool,
}

/// Machine credentials embedded in an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredentials {
    /// Globally unique; appears in exactly one instance.
    pub client_id: String,
    /// Always resolves to an entry in `secret_versions`.
    pub current_secret_version_id: String,
    /// When set, resolves and differs from the current version.
    pub next_secret_version_id: Option<String>,
    pub secret_versions: Vec<SecretVersion>,
}

impl ClientCredentials {
    /// Initial install: a single version that is immediately current.
    pub fn install(
        client_id: String,
        version_id: String,
        secret_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id,
            current_secret_version_id: version_id.clone(),
            next_secret_version_id: None,
            secret_versions: vec![SecretVersion {
                version_id,
                secret_hash,
                created_at: now,
                adopted_at: None,
                revoked_at: None,
                valid_until: None,
            }],
        }
    }

    pub fn version(&self, version_id: &str) -> Option<&SecretVersion> {
        self.secret_versions.iter().find(|v| v.version_id == version_id)
    }

    fn version_mut(&mut self, version_id: &str) -> Option<&mut SecretVersion> {
        self.secret_versions.iter_mut().find(|v| v.version_id == version_id)
    }

    /// Next free `sv_<N>`: one past the highest existing N.
    pub fn allocate_version_id(&self) -> String {
        let max = self
            .secret_versions
            .iter()
            .filter_map(|v| v.version_id.strip_prefix("sv_"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("sv_{}", max + 1)
    }

    /// Append a new version and mark it as the next secret.
    ///
    /// Fails while another rotation is in flight or when the version id
    /// is already taken.
    pub fn add_next_version(
        &mut self,
        instance_id: &str,
        version_id: String,
        secret_hash: String,
        valid_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.next_secret_version_id.is_some() {
            return Err(CoreError::RotationAlreadyInProgress {
                instance_id: instance_id.to_string(),
            });
        }
        if self.version(&version_id).is_some() {
            return Err(CoreError::Validation {
                message: format!("secret version already exists: {version_id}"),
            });
        }
        self.secret_versions.push(SecretVersion {
            version_id: version_id.clone(),
            secret_hash,
            created_at: now,
            adopted_at: None,
            revoked_at: None,
            valid_until,
        });
        self.next_secret_version_id = Some(version_id);
        Ok(())
    }

    /// Record the first authenticated use of a version. Idempotent;
    /// returns `true` only when `adopted_at` transitions from unset.
    ///
    /// Adoption is only legal on the next version: that is the handover
    /// signal the rotation protocol waits for.
    pub fn mark_adopted(&mut self, version_id: &str, now: DateTime<Utc>) -> CoreResult<bool> {
        let is_next = self.next_secret_version_id.as_deref() == Some(version_id);
        let version = self
            .version_mut(version_id)
            .ok_or_else(|| CoreError::SecretVersionNotFound {
                version_id: version_id.to_string(),
            })?;
        if version.adopted_at.is_some() {
            return Ok(false);
        }
        if !is_next {
            return Err(CoreError::Validation {
                message: format!("secret version {version_id} is not the next version"),
            });
        }
        version.adopted_at = Some(now);
        Ok(true)
    }

    /// Promote the adopted next version to current.
    ///
    /// The old current is revoked, the new current's overlap deadline is
    /// cleared, and the next pointer is reset. Returns
    /// `(old_version_id, new_version_id)`.
    pub fn promote_next(&mut self, instance_id: &str, now: DateTime<Utc>) -> CoreResult<(String, String)> {
        let next_id = self
            .next_secret_version_id
            .clone()
            .ok_or_else(|| CoreError::Validation {
                message: format!("no secret rotation in progress for instance {instance_id}"),
            })?;

        let next = self
            .version(&next_id)
            .ok_or_else(|| CoreError::SecretVersionNotFound {
                version_id: next_id.clone(),
            })?;
        if next.adopted_at.is_none() {
            return Err(CoreError::SecretRotationNotAdopted {
                instance_id: instance_id.to_string(),
            });
        }

        let old_id = self.current_secret_version_id.clone();
        {
            let old = self
                .version_mut(&old_id)
                .ok_or_else(|| CoreError::SecretVersionNotFound {
                    version_id: old_id.clone(),
                })?;
            if old.revoked_at.is_none() {
                old.revoked_at = Some(now);
            }
        }
        {
            let next = self
                .version_mut(&next_id)
                .ok_or_else(|| CoreError::SecretVersionNotFound {
                    version_id: next_id.clone(),
                })?;
            next.valid_until = None;
        }

        self.current_secret_version_id = next_id.clone();
        self.next_secret_version_id = None;
        Ok((old_id, next_id))
    }

    /// Revoke a version. `revoked_at` is monotonic: an already-revoked
    /// version keeps its original timestamp. Returns `true` when the
    /// revoked version was the next secret (its pointer is cleared).
    pub fn revoke_version(&mut self, version_id: &str, now: DateTime<Utc>) -> CoreResult<bool> {
        let version = self
            .version_mut(version_id)
            .ok_or_else(|| CoreError::SecretVersionNotFound {
                version_id: version_id.to_string(),
            })?;
        if version.revoked_at.is_none() {
            version.revoked_at = Some(now);
        }
        let was_next = self.next_secret_version_id.as_deref() == Some(version_id);
        if was_next {
            self.next_secret_version_id = None;
        }
        Ok(was_next)
    }

    /// Find the version matching a supplied secret hash.
    ///
    /// Revoked versions and versions past their overlap deadline are
    /// skipped. Every remaining candidate is compared in constant time,
    /// with no early exit, so old-current and new-next both authenticate
    /// during the overlap window.
    pub fn match_secret(&self, supplied_hash: &str, now: DateTime<Utc>) -> Option<SecretMatch> {
        let mut matched: Option<&SecretVersion> = None;
        for version in &self.secret_versions {
            if version.revoked_at.is_some() {
                continue;
            }
            if let Some(valid_until) = version.valid_until
                && now > valid_until
            {
                continue;
            }
            if crypto::constant_time_hex_eq(&version.secret_hash, supplied_hash) && matched.is_none() {
                matched = Some(version);
            }
        }
        matched.map(|version| SecretMatch {
            version_id: version.version_id.clone(),
            is_next_version: self.next_secret_version_id.as_deref() == Some(&version.version_id),
        })
    }
}
