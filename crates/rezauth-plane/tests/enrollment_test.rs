//! Integration tests for enrollment code issue and exchange.

use chrono::{Duration, TimeZone, Utc};
use rezauth_core::Clock;
use rezauth_core::clock::ManualClock;
use rezauth_core::crypto::sha256_hex;
use rezauth_core::error::CoreError;
use rezauth_core::models::audit::AuditEventType;
use rezauth_core::models::instance::CreateInstance;
use rezauth_core::models::reason::DenyReason;
use rezauth_core::models::tenant::CreateTenant;
use rezauth_core::store::SnapshotStore;
use rezauth_db::MemorySnapshotStore;
use rezauth_plane::{Enrollment, ExchangeOutcome, IssueEnrollmentCode, Registry};

struct Fixture {
    store: MemorySnapshotStore,
    clock: ManualClock,
    registry: Registry<MemorySnapshotStore, ManualClock>,
    enrollment: Enrollment<MemorySnapshotStore, ManualClock>,
}

async fn setup() -> Fixture {
    let store = MemorySnapshotStore::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    let registry = Registry::new(store.clone(), clock.clone());
    let enrollment = Enrollment::new(store.clone(), clock.clone());

    registry
        .create_tenant(CreateTenant {
            tenant_id: "tenant-acme".into(),
            name: "Acme Corp".into(),
            state: None,
            entitlement_state: None,
            actor: None,
        })
        .await
        .unwrap();
    registry
        .create_instance(CreateInstance {
            instance_id: "instance-dev-01".into(),
            tenant_id: "tenant-acme".into(),
            source: "sn://acme-dev.service-now.com".into(),
            state: None,
            allowed_services: None,
            actor: None,
        })
        .await
        .unwrap();

    Fixture {
        store,
        clock,
        registry,
        enrollment,
    }
}

fn issue_input() -> IssueEnrollmentCode {
    IssueEnrollmentCode {
        tenant_id: "tenant-acme".into(),
        instance_id: "instance-dev-01".into(),
        ttl_seconds: 900,
        requested_by: Some("operator@rezilient.test".into()),
    }
}

#[tokio::test]
async fn issue_returns_plaintext_once_and_persists_only_the_hash() {
    let fx = setup().await;
    let issued = fx.enrollment.issue(issue_input()).await.unwrap();

    assert!(issued.code_id.starts_with("enr_"));
    assert!(issued.enrollment_code.starts_with("enroll_"));
    assert_eq!(issued.expires_at, fx.clock.now() + Duration::seconds(900));

    let snapshot = fx.store.read().await.unwrap();
    let record = &snapshot.enrollment_codes[&issued.code_id];
    assert_eq!(record.code_hash, sha256_hex(&issued.enrollment_code));
    assert!(record.used_at.is_none());
    // The plaintext appears nowhere in the persisted snapshot.
    let raw = serde_json::to_string(&snapshot).unwrap();
    assert!(!raw.contains(&issued.enrollment_code));
}

#[tokio::test]
async fn issue_requires_a_linked_tenant_and_instance() {
    let fx = setup().await;

    let err = fx
        .enrollment
        .issue(IssueEnrollmentCode {
            tenant_id: "tenant-ghost".into(),
            ..issue_input()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TenantNotFound { .. }));

    let err = fx
        .enrollment
        .issue(IssueEnrollmentCode {
            instance_id: "instance-ghost".into(),
            ..issue_input()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InstanceNotFound { .. }));

    // A second tenant cannot issue codes for someone else's instance.
    fx.registry
        .create_tenant(CreateTenant {
            tenant_id: "tenant-other".into(),
            name: "Other".into(),
            state: None,
            entitlement_state: None,
            actor: None,
        })
        .await
        .unwrap();
    let err = fx
        .enrollment
        .issue(IssueEnrollmentCode {
            tenant_id: "tenant-other".into(),
            ..issue_input()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[tokio::test]
async fn exchange_installs_initial_credentials() {
    let fx = setup().await;
    let issued = fx.enrollment.issue(issue_input()).await.unwrap();

    let outcome = fx.enrollment.exchange(&issued.enrollment_code).await.unwrap();
    let grant = match outcome {
        ExchangeOutcome::Granted(grant) => grant,
        ExchangeOutcome::Denied { reason_code } => panic!("denied: {reason_code}"),
    };

    assert_eq!(grant.tenant_id, "tenant-acme");
    assert_eq!(grant.instance_id, "instance-dev-01");
    assert!(grant.client_id.starts_with("cli_"));
    assert!(grant.client_secret.starts_with("sec_"));
    assert_eq!(grant.secret_version_id, "sv_1");

    let snapshot = fx.store.read().await.unwrap();
    let instance = &snapshot.instances["instance-dev-01"];
    let credentials = instance.client_credentials.as_ref().unwrap();
    assert_eq!(credentials.client_id, grant.client_id);
    assert_eq!(
        credentials.secret_versions[0].secret_hash,
        sha256_hex(&grant.client_secret)
    );
    assert_eq!(snapshot.client_ids[&grant.client_id], "instance-dev-01");
    assert!(snapshot.enrollment_codes[&issued.code_id].used_at.is_some());
    assert!(
        snapshot
            .audit_events
            .iter()
            .any(|e| e.event_type == AuditEventType::EnrollmentCodeExchanged)
    );
}

#[tokio::test]
async fn exchange_replay_is_denied_as_used() {
    let fx = setup().await;
    let issued = fx.enrollment.issue(issue_input()).await.unwrap();

    let first = fx.enrollment.exchange(&issued.enrollment_code).await.unwrap();
    assert!(matches!(first, ExchangeOutcome::Granted(_)));

    let second = fx.enrollment.exchange(&issued.enrollment_code).await.unwrap();
    match second {
        ExchangeOutcome::Denied { reason_code } => {
            assert_eq!(reason_code, DenyReason::DeniedEnrollmentCodeUsed);
        }
        ExchangeOutcome::Granted(_) => panic!("replay must not succeed"),
    }
}

#[tokio::test]
async fn exchange_rejects_unknown_codes() {
    let fx = setup().await;
    let outcome = fx.enrollment.exchange("enroll_not-a-real-code").await.unwrap();
    match outcome {
        ExchangeOutcome::Denied { reason_code } => {
            assert_eq!(reason_code, DenyReason::DeniedInvalidEnrollmentCode);
        }
        ExchangeOutcome::Granted(_) => panic!("unknown code must not succeed"),
    }

    // The denial is audited with the exchange phase marker.
    let snapshot = fx.store.read().await.unwrap();
    let denial = snapshot
        .audit_events
        .iter()
        .find(|e| e.event_type == AuditEventType::TokenMintDenied)
        .unwrap();
    assert_eq!(
        denial.deny_reason,
        Some(DenyReason::DeniedInvalidEnrollmentCode)
    );
    assert_eq!(denial.metadata["phase"], "enrollment_exchange");
}

#[tokio::test]
async fn exchange_honors_the_expiry_boundary() {
    let fx = setup().await;
    let issued = fx.enrollment.issue(issue_input()).await.unwrap();

    // Exactly at expiry the code is still good.
    fx.clock.advance_seconds(900);
    let outcome = fx.enrollment.exchange(&issued.enrollment_code).await.unwrap();
    assert!(matches!(outcome, ExchangeOutcome::Granted(_)));
}

#[tokio::test]
async fn exchange_rejects_expired_codes() {
    let fx = setup().await;
    let issued = fx.enrollment.issue(issue_input()).await.unwrap();

    fx.clock.advance_seconds(901);
    let outcome = fx.enrollment.exchange(&issued.enrollment_code).await.unwrap();
    match outcome {
        ExchangeOutcome::Denied { reason_code } => {
            assert_eq!(reason_code, DenyReason::DeniedEnrollmentCodeExpired);
        }
        ExchangeOutcome::Granted(_) => panic!("expired code must not succeed"),
    }
}

#[tokio::test]
async fn exchange_treats_existing_credentials_as_used() {
    let fx = setup().await;
    let issued = fx.enrollment.issue(issue_input()).await.unwrap();

    // Credentials landed through another path before this exchange ran;
    // the unused code must still be refused.
    fx.registry
        .set_initial_credentials("instance-dev-01", "cli_race", "sv_1", &sha256_hex("sec_raw"))
        .await
        .unwrap();

    let outcome = fx.enrollment.exchange(&issued.enrollment_code).await.unwrap();
    match outcome {
        ExchangeOutcome::Denied { reason_code } => {
            assert_eq!(reason_code, DenyReason::DeniedEnrollmentCodeUsed);
        }
        ExchangeOutcome::Granted(_) => panic!("must not double-enroll"),
    }
}

#[tokio::test]
async fn client_ids_map_one_to_one_onto_instances() {
    let fx = setup().await;
    fx.registry
        .create_instance(CreateInstance {
            instance_id: "instance-dev-02".into(),
            tenant_id: "tenant-acme".into(),
            source: "sn://acme-dev-02.service-now.com".into(),
            state: None,
            allowed_services: None,
            actor: None,
        })
        .await
        .unwrap();

    let mut grants = Vec::new();
    for instance_id in ["instance-dev-01", "instance-dev-02"] {
        let issued = fx
            .enrollment
            .issue(IssueEnrollmentCode {
                instance_id: instance_id.into(),
                ..issue_input()
            })
            .await
            .unwrap();
        match fx.enrollment.exchange(&issued.enrollment_code).await.unwrap() {
            ExchangeOutcome::Granted(grant) => grants.push(grant),
            ExchangeOutcome::Denied { reason_code } => panic!("denied: {reason_code}"),
        }
    }

    assert_ne!(grants[0].client_id, grants[1].client_id);
    let snapshot = fx.store.read().await.unwrap();
    assert_eq!(snapshot.client_ids.len(), 2);
    assert_eq!(snapshot.client_ids[&grants[0].client_id], "instance-dev-01");
    assert_eq!(snapshot.client_ids[&grants[1].client_id], "instance-dev-02");
}
