//! Token service — mint, validate, outage mode, and in-flight
//! entitlement evaluation.

use chrono::{DateTime, Utc};
use rezauth_core::clock::Clock;
use rezauth_core::crypto::{self, CompactTokenError, random_token, sha256_hex};
use rezauth_core::error::{CoreError, CoreResult};
use rezauth_core::models::audit::{
    AuditEvent, AuditEventType, CreateAuditEvent, RedactionPolicy, metadata_value,
};
use rezauth_core::models::instance::{ClientCredentials, SecretMatch};
use rezauth_core::models::reason::{DenyReason, InFlightAction, InFlightReason, RefreshAction};
use rezauth_core::models::scope::ServiceScope;
use rezauth_core::models::snapshot::ControlPlaneSnapshot;
use rezauth_core::models::tenant::LifecycleState;
use rezauth_core::store::SnapshotStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenConfig;

/// The only accepted OAuth-style grant type.
const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Whether a mint request is a first issue or an in-flight refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFlow {
    Mint,
    Refresh,
}

/// Input to [`TokenService::mint`].
#[derive(Debug, Clone)]
pub struct MintRequest {
    /// Must be `client_credentials` when present.
    pub grant_type: Option<String>,
    /// Defaults to [`TokenFlow::Mint`].
    pub flow: Option<TokenFlow>,
    pub client_id: String,
    pub client_secret: String,
    pub service_scope: String,
}

/// Claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    /// Client id.
    pub sub: String,
    /// `rezilient:<scope>`.
    pub aud: String,
    /// `tok_<rand>`.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub service_scope: ServiceScope,
    pub tenant_id: String,
    pub instance_id: String,
    pub source: String,
}

/// A successfully minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
    pub scope: ServiceScope,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tenant_id: String,
    pub instance_id: String,
    pub source: String,
}

/// Outcome of a mint attempt.
#[derive(Debug, Clone)]
pub enum MintOutcome {
    Issued(IssuedToken),
    Denied { reason_code: DenyReason },
}

/// Input to [`TokenService::validate`].
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    pub access_token: String,
    pub expected_service_scope: Option<ServiceScope>,
}

/// Outcome of a validate attempt.
#[derive(Debug, Clone)]
pub enum ValidateOutcome {
    Valid(TokenClaims),
    Denied { reason_code: DenyReason },
}

/// Verdict for a refresh attempt during an outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshEvaluation {
    pub action: RefreshAction,
    pub reason: Option<InFlightReason>,
}

/// Verdict for in-flight work given tenant/instance eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlightEvaluation {
    pub action: InFlightAction,
    pub reason: Option<InFlightReason>,
}

/// Everything the mint path needs from the registry, captured as owned
/// data so the decision can run before the snapshot is mutated.
struct MintSubject {
    tenant_id: String,
    instance_id: String,
    source: String,
    tenant_state: LifecycleState,
    entitlement_state: LifecycleState,
    instance_state: LifecycleState,
    allowed_services: Vec<ServiceScope>,
    credentials: ClientCredentials,
}

/// Mints and validates access tokens and owns the outage switch.
#[derive(Clone)]
pub struct TokenService<S: SnapshotStore, C: Clock> {
    config: TokenConfig,
    store: S,
    clock: C,
    policy: RedactionPolicy,
}

impl<S: SnapshotStore, C: Clock> TokenService<S, C> {
    pub fn new(config: TokenConfig, store: S, clock: C) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            clock,
            policy: RedactionPolicy::default(),
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    // -------------------------------------------------------------------
    // Mint
    // -------------------------------------------------------------------

    /// Evaluate the mint decision matrix and issue a signed token.
    ///
    /// Rules run in strict order; the first failure wins, is returned
    /// as the outcome, and is emitted as a `token_mint_denied` event.
    /// The whole decision — including adoption detection — runs in one
    /// transaction against the snapshot.
    pub async fn mint(&self, request: MintRequest) -> CoreResult<MintOutcome> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                // 1. Grant type, when present, must be client_credentials.
                if let Some(grant_type) = &request.grant_type
                    && grant_type != GRANT_CLIENT_CREDENTIALS
                {
                    return Ok(self.deny_mint(
                        snap,
                        DenyReason::DeniedInvalidGrant,
                        &request,
                        None,
                        None,
                        now,
                    ));
                }

                // 2. The requested scope must be a known service.
                let Some(scope) = ServiceScope::parse(&request.service_scope) else {
                    return Ok(self.deny_mint(
                        snap,
                        DenyReason::DeniedServiceNotAllowed,
                        &request,
                        None,
                        None,
                        now,
                    ));
                };

                // 3. Outage mode fails the mint path closed.
                if snap.outage_active {
                    return Ok(self.deny_mint(
                        snap,
                        DenyReason::DeniedAuthControlPlaneOutage,
                        &request,
                        Some(scope),
                        None,
                        now,
                    ));
                }

                // 4. Resolve client → instance → credentials → tenant.
                let Some(subject) = Self::resolve_subject(snap, &request.client_id) else {
                    return Ok(self.deny_mint(
                        snap,
                        DenyReason::DeniedInvalidClient,
                        &request,
                        Some(scope),
                        None,
                        now,
                    ));
                };
                let identity = (subject.tenant_id.clone(), subject.instance_id.clone());

                // 5. Tenant eligibility.
                let tenant_denial = match (subject.tenant_state, subject.entitlement_state) {
                    (LifecycleState::Suspended, _) => Some(DenyReason::DeniedTenantSuspended),
                    (LifecycleState::Disabled, _) => Some(DenyReason::DeniedTenantDisabled),
                    (_, LifecycleState::Suspended) | (_, LifecycleState::Disabled) => {
                        Some(DenyReason::DeniedTenantNotEntitled)
                    }
                    _ => None,
                };
                if let Some(reason) = tenant_denial {
                    return Ok(self.deny_mint(
                        snap,
                        reason,
                        &request,
                        Some(scope),
                        Some(&identity),
                        now,
                    ));
                }

                // 6. Instance eligibility.
                let instance_denial = match subject.instance_state {
                    LifecycleState::Suspended => Some(DenyReason::DeniedInstanceSuspended),
                    LifecycleState::Disabled => Some(DenyReason::DeniedInstanceDisabled),
                    LifecycleState::Active => None,
                };
                if let Some(reason) = instance_denial {
                    return Ok(self.deny_mint(
                        snap,
                        reason,
                        &request,
                        Some(scope),
                        Some(&identity),
                        now,
                    ));
                }

                // 7. The scope must be allowed on the instance.
                if !subject.allowed_services.contains(&scope) {
                    return Ok(self.deny_mint(
                        snap,
                        DenyReason::DeniedServiceNotAllowed,
                        &request,
                        Some(scope),
                        Some(&identity),
                        now,
                    ));
                }

                // 8. A live secret version must match the supplied secret.
                let supplied_hash = sha256_hex(&request.client_secret);
                let Some(matched) = subject.credentials.match_secret(&supplied_hash, now) else {
                    return Ok(self.deny_mint(
                        snap,
                        DenyReason::DeniedInvalidSecret,
                        &request,
                        Some(scope),
                        Some(&identity),
                        now,
                    ));
                };

                self.issue(snap, &request, scope, subject, matched, now)
            })
            .await
    }

    fn resolve_subject(snap: &ControlPlaneSnapshot, client_id: &str) -> Option<MintSubject> {
        let instance = snap.instance_by_client_id(client_id)?;
        let credentials = instance.client_credentials.clone()?;
        let tenant = snap.tenants.get(&instance.tenant_id)?;
        Some(MintSubject {
            tenant_id: instance.tenant_id.clone(),
            instance_id: instance.instance_id.clone(),
            source: instance.source.clone(),
            tenant_state: tenant.state,
            entitlement_state: tenant.entitlement_state,
            instance_state: instance.state,
            allowed_services: instance.allowed_services.clone(),
            credentials,
        })
    }

    fn issue(
        &self,
        snap: &mut ControlPlaneSnapshot,
        request: &MintRequest,
        scope: ServiceScope,
        subject: MintSubject,
        matched: SecretMatch,
        now: DateTime<Utc>,
    ) -> CoreResult<MintOutcome> {
        let iat = now.timestamp();
        let exp = iat + self.config.token_ttl_seconds as i64;
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| CoreError::Internal("token expiry out of range".into()))?;

        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            sub: request.client_id.clone(),
            aud: scope.audience(),
            jti: format!("tok_{}", random_token(12)),
            iat,
            exp,
            service_scope: scope,
            tenant_id: subject.tenant_id.clone(),
            instance_id: subject.instance_id.clone(),
            source: subject.source.clone(),
        };
        let access_token = crypto::sign_compact(&claims, &self.config.signing_key)?;

        // First use of the next secret marks it adopted, inside this
        // same transaction.
        if matched.is_next_version {
            let instance = snap.instance_mut(&subject.instance_id)?;
            let credentials = instance.client_credentials.as_mut().ok_or_else(|| {
                CoreError::CredentialsNotFound {
                    instance_id: subject.instance_id.clone(),
                }
            })?;
            if credentials.mark_adopted(&matched.version_id, now)? {
                instance.updated_at = now;
                let mut event = CreateAuditEvent::new(AuditEventType::SecretRotationAdopted);
                event.tenant_id = Some(subject.tenant_id.clone());
                event.instance_id = Some(subject.instance_id.clone());
                event.client_id = Some(request.client_id.clone());
                event.metadata.insert(
                    "secret_version_id".into(),
                    metadata_value(&matched.version_id),
                );
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
            }
        }

        let event_type = match request.flow {
            Some(TokenFlow::Refresh) => AuditEventType::TokenRefreshed,
            _ => AuditEventType::TokenMinted,
        };
        let mut event = CreateAuditEvent::new(event_type);
        event.tenant_id = Some(subject.tenant_id.clone());
        event.instance_id = Some(subject.instance_id.clone());
        event.client_id = Some(request.client_id.clone());
        event.service_scope = Some(scope);
        event.metadata.insert("jti".into(), metadata_value(&claims.jti));
        event.metadata.insert(
            "secret_version_id".into(),
            metadata_value(&matched.version_id),
        );
        event
            .metadata
            .insert("expires_at".into(), metadata_value(&expires_at));
        snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));

        Ok(MintOutcome::Issued(IssuedToken {
            access_token,
            expires_in: self.config.token_ttl_seconds,
            scope,
            issued_at: now,
            expires_at,
            tenant_id: subject.tenant_id,
            instance_id: subject.instance_id,
            source: subject.source,
        }))
    }

    fn deny_mint(
        &self,
        snap: &mut ControlPlaneSnapshot,
        reason: DenyReason,
        request: &MintRequest,
        scope: Option<ServiceScope>,
        identity: Option<&(String, String)>,
        now: DateTime<Utc>,
    ) -> MintOutcome {
        let mut event = CreateAuditEvent::new(AuditEventType::TokenMintDenied);
        event.deny_reason = Some(reason);
        event.client_id = Some(request.client_id.clone());
        event.service_scope = scope;
        if let Some((tenant_id, instance_id)) = identity {
            event.tenant_id = Some(tenant_id.clone());
            event.instance_id = Some(instance_id.clone());
        }
        event
            .metadata
            .insert("flow".into(), metadata_value(&flow_name(request.flow)));
        snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
        MintOutcome::Denied {
            reason_code: reason,
        }
    }

    // -------------------------------------------------------------------
    // Validate
    // -------------------------------------------------------------------

    /// Check a token's shape, signature, claims, expiry (with skew),
    /// and optionally its scope. Every path emits an audit event.
    pub async fn validate(&self, request: ValidateRequest) -> CoreResult<ValidateOutcome> {
        let now = self.clock.now();
        let checked = self.check_token(
            &request.access_token,
            request.expected_service_scope,
            now,
        );

        self.store
            .mutate(|snap| {
                match &checked {
                    Ok(claims) => {
                        let mut event = CreateAuditEvent::new(AuditEventType::TokenValidated);
                        event.tenant_id = Some(claims.tenant_id.clone());
                        event.instance_id = Some(claims.instance_id.clone());
                        event.client_id = Some(claims.sub.clone());
                        event.service_scope = Some(claims.service_scope);
                        event.metadata.insert("jti".into(), metadata_value(&claims.jti));
                        snap.append_audit(AuditEvent::record(
                            event,
                            Uuid::new_v4(),
                            now,
                            &self.policy,
                        ));
                    }
                    Err((reason, claims)) => {
                        let mut event = CreateAuditEvent::new(AuditEventType::TokenValidateDenied);
                        event.deny_reason = Some(*reason);
                        // Claim identities are only trustworthy once the
                        // signature checked out.
                        if let Some(claims) = claims {
                            event.tenant_id = Some(claims.tenant_id.clone());
                            event.instance_id = Some(claims.instance_id.clone());
                            event.client_id = Some(claims.sub.clone());
                            event.service_scope = Some(claims.service_scope);
                        }
                        snap.append_audit(AuditEvent::record(
                            event,
                            Uuid::new_v4(),
                            now,
                            &self.policy,
                        ));
                    }
                }
                Ok(())
            })
            .await?;

        Ok(match checked {
            Ok(claims) => ValidateOutcome::Valid(claims),
            Err((reason_code, _)) => ValidateOutcome::Denied { reason_code },
        })
    }

    fn check_token(
        &self,
        token: &str,
        expected_scope: Option<ServiceScope>,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, (DenyReason, Option<TokenClaims>)> {
        let payload = match crypto::verify_compact(token, &self.config.signing_key) {
            Ok(payload) => payload,
            Err(CompactTokenError::Malformed) => {
                return Err((DenyReason::DeniedTokenMalformed, None));
            }
            Err(CompactTokenError::InvalidSignature) => {
                return Err((DenyReason::DeniedTokenInvalidSignature, None));
            }
        };

        let malformed = || (DenyReason::DeniedTokenMalformed, None);
        let str_claim = |key: &str| -> Option<String> {
            payload.get(key).and_then(|v| v.as_str()).map(String::from)
        };
        let int_claim = |key: &str| -> Option<i64> { payload.get(key).and_then(|v| v.as_i64()) };

        let iss = str_claim("iss").ok_or_else(malformed)?;
        let sub = str_claim("sub").ok_or_else(malformed)?;
        let aud = str_claim("aud").ok_or_else(malformed)?;
        let jti = str_claim("jti").ok_or_else(malformed)?;
        let iat = int_claim("iat").ok_or_else(malformed)?;
        let exp = int_claim("exp").ok_or_else(malformed)?;
        let service_scope = str_claim("service_scope")
            .and_then(|s| ServiceScope::parse(&s))
            .ok_or_else(malformed)?;
        let tenant_id = str_claim("tenant_id").ok_or_else(malformed)?;
        let instance_id = str_claim("instance_id").ok_or_else(malformed)?;
        let source = str_claim("source").ok_or_else(malformed)?;

        let claims = TokenClaims {
            iss,
            sub,
            aud,
            jti,
            iat,
            exp,
            service_scope,
            tenant_id,
            instance_id,
            source,
        };

        if claims.iss != self.config.issuer {
            return Err((DenyReason::DeniedTokenMalformed, Some(claims)));
        }
        let skew = self.config.token_clock_skew_seconds as i64;
        if now.timestamp() > claims.exp + skew {
            return Err((DenyReason::DeniedTokenExpired, Some(claims)));
        }
        if let Some(expected) = expected_scope
            && expected != claims.service_scope
        {
            return Err((DenyReason::DeniedTokenWrongServiceScope, Some(claims)));
        }
        Ok(claims)
    }

    // -------------------------------------------------------------------
    // Outage mode
    // -------------------------------------------------------------------

    /// Flip the fail-closed switch for the mint path.
    pub async fn set_outage_mode(&self, active: bool, actor: Option<String>) -> CoreResult<()> {
        let now = self.clock.now();
        self.store
            .mutate(|snap| {
                snap.outage_active = active;
                let mut event =
                    CreateAuditEvent::new(AuditEventType::ControlPlaneOutageModeChanged);
                event.actor = actor.clone();
                event
                    .metadata
                    .insert("outage_active".into(), metadata_value(&active));
                snap.append_audit(AuditEvent::record(event, Uuid::new_v4(), now, &self.policy));
                Ok(())
            })
            .await
    }

    pub async fn is_outage_mode_active(&self) -> CoreResult<bool> {
        Ok(self.store.read().await?.outage_active)
    }

    /// Decide what an in-flight refresh attempt should do while the
    /// control plane is degraded. The grace window is inclusive.
    pub async fn evaluate_refresh_during_outage(
        &self,
        token_expires_at: DateTime<Utc>,
    ) -> CoreResult<RefreshEvaluation> {
        let snapshot = self.store.read().await?;
        if !snapshot.outage_active {
            return Ok(RefreshEvaluation {
                action: RefreshAction::RefreshAllowed,
                reason: None,
            });
        }
        let now_ms = self.clock.now().timestamp_millis();
        let grace_ms = self.config.outage_grace_window_seconds as i64 * 1000;
        if now_ms <= token_expires_at.timestamp_millis() + grace_ms {
            Ok(RefreshEvaluation {
                action: RefreshAction::RetryWithinGrace,
                reason: Some(InFlightReason::BlockedAuthControlPlaneOutage),
            })
        } else {
            Ok(RefreshEvaluation {
                action: RefreshAction::PauseInFlight,
                reason: Some(InFlightReason::PausedTokenRefreshGraceExhausted),
            })
        }
    }

    // -------------------------------------------------------------------
    // In-flight entitlement
    // -------------------------------------------------------------------

    /// Decide whether in-flight work for an instance may keep going.
    ///
    /// Fully active tenant + instance → continue. Anything else pauses,
    /// either immediately (at a chunk boundary) or at the next one; a
    /// missing instance counts as instance-disabled.
    pub async fn evaluate_in_flight_entitlement(
        &self,
        instance_id: &str,
        at_chunk_boundary: bool,
    ) -> CoreResult<InFlightEvaluation> {
        let snapshot = self.store.read().await?;

        let reason = match snapshot.instances.get(instance_id) {
            None => Some(InFlightReason::PausedInstanceDisabled),
            Some(instance) if instance.state != LifecycleState::Active => {
                Some(InFlightReason::PausedInstanceDisabled)
            }
            Some(instance) => match snapshot.tenants.get(&instance.tenant_id) {
                Some(tenant)
                    if tenant.state == LifecycleState::Active
                        && tenant.entitlement_state == LifecycleState::Active =>
                {
                    None
                }
                _ => Some(InFlightReason::PausedEntitlementDisabled),
            },
        };

        Ok(match reason {
            None => InFlightEvaluation {
                action: InFlightAction::Continue,
                reason: None,
            },
            Some(reason) => InFlightEvaluation {
                action: if at_chunk_boundary {
                    InFlightAction::Pause
                } else {
                    InFlightAction::ContinueUntilChunkBoundary
                },
                reason: Some(reason),
            },
        })
    }
}

fn flow_name(flow: Option<TokenFlow>) -> &'static str {
    match flow {
        Some(TokenFlow::Refresh) => "refresh",
        _ => "mint",
    }
}
