//! Integration tests for the dual-secret rotation lifecycle.

use chrono::{Duration, TimeZone, Utc};
use rezauth_core::Clock;
use rezauth_core::clock::ManualClock;
use rezauth_core::error::CoreError;
use rezauth_core::models::audit::AuditEventType;
use rezauth_core::models::instance::CreateInstance;
use rezauth_core::models::tenant::CreateTenant;
use rezauth_core::store::SnapshotStore;
use rezauth_db::MemorySnapshotStore;
use rezauth_plane::{Enrollment, EnrollmentGrant, ExchangeOutcome, IssueEnrollmentCode, Registry, Rotation};

struct Fixture {
    store: MemorySnapshotStore,
    clock: ManualClock,
    rotation: Rotation<MemorySnapshotStore, ManualClock>,
    grant: EnrollmentGrant,
}

async fn setup() -> Fixture {
    let store = MemorySnapshotStore::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    let registry = Registry::new(store.clone(), clock.clone());
    let enrollment = Enrollment::new(store.clone(), clock.clone());
    let rotation = Rotation::new(store.clone(), clock.clone());

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
    let issued = enrollment
        .issue(IssueEnrollmentCode {
            tenant_id: "tenant-acme".into(),
            instance_id: "instance-dev-01".into(),
            ttl_seconds: 900,
            requested_by: None,
        })
        .await
        .unwrap();
    let grant = match enrollment.exchange(&issued.enrollment_code).await.unwrap() {
        ExchangeOutcome::Granted(grant) => grant,
        ExchangeOutcome::Denied { reason_code } => panic!("denied: {reason_code}"),
    };

    Fixture {
        store,
        clock,
        rotation,
        grant,
    }
}

#[tokio::test]
async fn start_allocates_the_next_version() {
    let fx = setup().await;
    let start = fx
        .rotation
        .start("instance-dev-01", 3600, Some("operator".into()))
        .await
        .unwrap();

    assert_eq!(start.next_secret_version_id, "sv_2");
    assert!(start.next_client_secret.starts_with("sec_"));
    assert_eq!(
        start.overlap_expires_at,
        fx.clock.now() + Duration::seconds(3600)
    );
    assert_ne!(start.next_client_secret, fx.grant.client_secret);

    let snapshot = fx.store.read().await.unwrap();
    let credentials = snapshot.instances["instance-dev-01"]
        .client_credentials
        .clone()
        .unwrap();
    assert_eq!(credentials.current_secret_version_id, "sv_1");
    assert_eq!(credentials.next_secret_version_id.as_deref(), Some("sv_2"));
    let next = credentials.version("sv_2").unwrap();
    assert_eq!(next.valid_until, Some(start.overlap_expires_at));
    assert!(next.adopted_at.is_none());
}

#[tokio::test]
async fn second_start_loses_deterministically() {
    let fx = setup().await;
    fx.rotation.start("instance-dev-01", 3600, None).await.unwrap();
    let err = fx
        .rotation
        .start("instance-dev-01", 3600, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::RotationAlreadyInProgress { .. }));
}

#[tokio::test]
async fn start_requires_an_existing_instance() {
    let fx = setup().await;
    let err = fx.rotation.start("instance-ghost", 3600, None).await.unwrap_err();
    assert!(matches!(err, CoreError::InstanceNotFound { .. }));
}

#[tokio::test]
async fn start_requires_credentials() {
    let store = MemorySnapshotStore::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    let registry = Registry::new(store.clone(), clock.clone());
    let rotation = Rotation::new(store, clock);
    registry
        .create_tenant(CreateTenant {
            tenant_id: "t".into(),
            name: "T".into(),
            state: None,
            entitlement_state: None,
            actor: None,
        })
        .await
        .unwrap();
    registry
        .create_instance(CreateInstance {
            instance_id: "bare".into(),
            tenant_id: "t".into(),
            source: "sn://bare".into(),
            state: None,
            allowed_services: None,
            actor: None,
        })
        .await
        .unwrap();
    let err = rotation.start("bare", 3600, None).await.unwrap_err();
    assert!(matches!(err, CoreError::CredentialsNotFound { .. }));
}

#[tokio::test]
async fn complete_requires_adoption() {
    let fx = setup().await;
    fx.rotation.start("instance-dev-01", 3600, None).await.unwrap();
    let err = fx
        .rotation
        .complete("instance-dev-01", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SecretRotationNotAdopted { .. }));
}

#[tokio::test]
async fn adoption_is_idempotent_and_audited_once() {
    let fx = setup().await;
    fx.rotation.start("instance-dev-01", 3600, None).await.unwrap();

    fx.rotation
        .record_adoption("instance-dev-01", "sv_2")
        .await
        .unwrap();
    let snapshot = fx.store.read().await.unwrap();
    let adopted_at = snapshot.instances["instance-dev-01"]
        .client_credentials
        .as_ref()
        .unwrap()
        .version("sv_2")
        .unwrap()
        .adopted_at
        .unwrap();

    fx.clock.advance_seconds(60);
    fx.rotation
        .record_adoption("instance-dev-01", "sv_2")
        .await
        .unwrap();

    let snapshot = fx.store.read().await.unwrap();
    let credentials = snapshot.instances["instance-dev-01"]
        .client_credentials
        .as_ref()
        .unwrap();
    assert_eq!(credentials.version("sv_2").unwrap().adopted_at, Some(adopted_at));
    let adoption_events = snapshot
        .audit_events
        .iter()
        .filter(|e| e.event_type == AuditEventType::SecretRotationAdopted)
        .count();
    assert_eq!(adoption_events, 1);
}

#[tokio::test]
async fn complete_promotes_and_retires_the_old_secret() {
    let fx = setup().await;
    fx.rotation.start("instance-dev-01", 3600, None).await.unwrap();
    fx.rotation
        .record_adoption("instance-dev-01", "sv_2")
        .await
        .unwrap();

    let completion = fx
        .rotation
        .complete("instance-dev-01", Some("operator".into()))
        .await
        .unwrap();
    assert_eq!(completion.old_secret_version_id, "sv_1");
    assert_eq!(completion.new_secret_version_id, "sv_2");

    let credentials = completion.instance.client_credentials.unwrap();
    assert_eq!(credentials.current_secret_version_id, "sv_2");
    assert!(credentials.next_secret_version_id.is_none());
    assert!(credentials.version("sv_1").unwrap().revoked_at.is_some());
    assert!(credentials.version("sv_2").unwrap().valid_until.is_none());

    let snapshot = fx.store.read().await.unwrap();
    assert!(
        snapshot
            .audit_events
            .iter()
            .any(|e| e.event_type == AuditEventType::SecretRotationCompleted)
    );
}

#[tokio::test]
async fn revoking_the_next_secret_abandons_the_rotation() {
    let fx = setup().await;
    fx.rotation.start("instance-dev-01", 3600, None).await.unwrap();

    let instance = fx
        .rotation
        .revoke(
            "instance-dev-01",
            "sv_2",
            Some("compromised".into()),
            Some("operator".into()),
        )
        .await
        .unwrap();
    let credentials = instance.client_credentials.unwrap();
    assert!(credentials.next_secret_version_id.is_none());
    assert!(credentials.version("sv_2").unwrap().revoked_at.is_some());

    // The rotation slot is free again and version numbers keep rising.
    let restart = fx.rotation.start("instance-dev-01", 3600, None).await.unwrap();
    assert_eq!(restart.next_secret_version_id, "sv_3");

    let snapshot = fx.store.read().await.unwrap();
    let revoked = snapshot
        .audit_events
        .iter()
        .find(|e| e.event_type == AuditEventType::SecretRevoked)
        .unwrap();
    assert_eq!(revoked.metadata["reason"], "compromised");
    assert_eq!(revoked.metadata["secret_version_id"], "sv_2");
}
