//! Integration tests for the registry service.

use chrono::{TimeZone, Utc};
use rezauth_core::clock::ManualClock;
use rezauth_core::crypto::sha256_hex;
use rezauth_core::error::CoreError;
use rezauth_core::models::audit::AuditEventType;
use rezauth_core::models::instance::CreateInstance;
use rezauth_core::models::scope::ServiceScope;
use rezauth_core::models::tenant::{CreateTenant, LifecycleState};
use rezauth_core::store::SnapshotStore;
use rezauth_db::MemorySnapshotStore;
use rezauth_plane::Registry;

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
}

fn setup() -> (MemorySnapshotStore, ManualClock, Registry<MemorySnapshotStore, ManualClock>) {
    let store = MemorySnapshotStore::new();
    let clock = clock();
    let registry = Registry::new(store.clone(), clock.clone());
    (store, clock, registry)
}

fn create_tenant(tenant_id: &str) -> CreateTenant {
    CreateTenant {
        tenant_id: tenant_id.into(),
        name: "Acme Corp".into(),
        state: None,
        entitlement_state: None,
        actor: Some("admin@rezilient.test".into()),
    }
}

fn create_instance(instance_id: &str, tenant_id: &str, source: &str) -> CreateInstance {
    CreateInstance {
        instance_id: instance_id.into(),
        tenant_id: tenant_id.into(),
        source: source.into(),
        state: None,
        allowed_services: None,
        actor: None,
    }
}

#[tokio::test]
async fn create_tenant_defaults_to_active() {
    let (_, _, registry) = setup();
    let tenant = registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    assert_eq!(tenant.tenant_id, "tenant-acme");
    assert_eq!(tenant.state, LifecycleState::Active);
    assert_eq!(tenant.entitlement_state, LifecycleState::Active);
    assert_eq!(tenant.created_at, tenant.updated_at);
}

#[tokio::test]
async fn create_tenant_rejects_duplicates() {
    let (_, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    let err = registry
        .create_tenant(create_tenant("tenant-acme"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TenantAlreadyExists { .. }));
}

#[tokio::test]
async fn tenant_state_transitions_are_unrestricted() {
    let (_, clock, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();

    clock.advance_seconds(5);
    let tenant = registry
        .set_tenant_state("tenant-acme", LifecycleState::Disabled, None)
        .await
        .unwrap();
    assert_eq!(tenant.state, LifecycleState::Disabled);
    assert!(tenant.updated_at > tenant.created_at);

    // disabled → suspended → active, no intermediate constraints.
    registry
        .set_tenant_state("tenant-acme", LifecycleState::Suspended, None)
        .await
        .unwrap();
    let tenant = registry
        .set_tenant_state("tenant-acme", LifecycleState::Active, None)
        .await
        .unwrap();
    assert_eq!(tenant.state, LifecycleState::Active);

    let tenant = registry
        .set_tenant_entitlement("tenant-acme", LifecycleState::Suspended, None)
        .await
        .unwrap();
    assert_eq!(tenant.entitlement_state, LifecycleState::Suspended);
    // Account state is untouched by entitlement changes.
    assert_eq!(tenant.state, LifecycleState::Active);
}

#[tokio::test]
async fn tenant_mutations_require_existence() {
    let (_, _, registry) = setup();
    let err = registry
        .set_tenant_state("tenant-ghost", LifecycleState::Active, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TenantNotFound { .. }));
}

#[tokio::test]
async fn create_instance_defaults_to_full_service_set() {
    let (_, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    let instance = registry
        .create_instance(create_instance(
            "instance-dev-01",
            "tenant-acme",
            "sn://acme-dev.service-now.com",
        ))
        .await
        .unwrap();
    assert_eq!(instance.state, LifecycleState::Active);
    assert_eq!(
        instance.allowed_services,
        vec![ServiceScope::Reg, ServiceScope::Rrs]
    );
    assert!(instance.client_credentials.is_none());
}

#[tokio::test]
async fn create_instance_enforces_uniqueness() {
    let (_, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://a"))
        .await
        .unwrap();

    let err = registry
        .create_instance(create_instance("instance-dev-99", "tenant-ghost", "sn://b"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TenantNotFound { .. }));

    let err = registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://c"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InstanceAlreadyExists { .. }));

    // Sources are unique across all instances.
    let err = registry
        .create_instance(create_instance("instance-dev-02", "tenant-acme", "sn://a"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SourceMappingAlreadyExists { .. }));
}

#[tokio::test]
async fn allowed_services_are_normalized() {
    let (_, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://a"))
        .await
        .unwrap();

    let instance = registry
        .set_instance_allowed_services(
            "instance-dev-01",
            vec![ServiceScope::Rrs, ServiceScope::Reg, ServiceScope::Rrs],
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        instance.allowed_services,
        vec![ServiceScope::Reg, ServiceScope::Rrs]
    );

    let err = registry
        .set_instance_allowed_services("instance-dev-01", vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[tokio::test]
async fn initial_credentials_install_once() {
    let (_, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://a"))
        .await
        .unwrap();
    registry
        .create_instance(create_instance("instance-dev-02", "tenant-acme", "sn://b"))
        .await
        .unwrap();

    let instance = registry
        .set_initial_credentials("instance-dev-01", "cli_one", "sv_1", &sha256_hex("sec_raw"))
        .await
        .unwrap();
    let credentials = instance.client_credentials.unwrap();
    assert_eq!(credentials.client_id, "cli_one");
    assert_eq!(credentials.current_secret_version_id, "sv_1");
    assert_eq!(credentials.secret_versions.len(), 1);

    // The same client id cannot bind to a second instance.
    let err = registry
        .set_initial_credentials("instance-dev-02", "cli_one", "sv_1", &sha256_hex("sec_other"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ClientIdAlreadyBound { .. }));

    // An instance cannot take credentials under a second client id.
    let err = registry
        .set_initial_credentials("instance-dev-01", "cli_two", "sv_1", &sha256_hex("sec_other"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let found = registry.get_instance_by_client_id("cli_one").await.unwrap();
    assert_eq!(found.unwrap().instance_id, "instance-dev-01");
    assert!(registry.get_instance_by_client_id("cli_none").await.unwrap().is_none());
}

#[tokio::test]
async fn each_mutation_appends_one_audit_event() {
    let (store, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://a"))
        .await
        .unwrap();
    registry
        .set_tenant_state("tenant-acme", LifecycleState::Suspended, None)
        .await
        .unwrap();
    registry
        .set_instance_state("instance-dev-01", LifecycleState::Suspended, None)
        .await
        .unwrap();

    let snapshot = store.read().await.unwrap();
    let types: Vec<AuditEventType> = snapshot
        .audit_events
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            AuditEventType::TenantCreated,
            AuditEventType::InstanceCreated,
            AuditEventType::TenantStateChanged,
            AuditEventType::InstanceStateChanged,
        ]
    );
    // The normalized projection moves in lockstep.
    assert_eq!(snapshot.cross_service_events.len(), 4);
}

#[tokio::test]
async fn reads_return_owned_copies() {
    let (_, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();
    registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://a"))
        .await
        .unwrap();

    let mut copy = registry.get_instance("instance-dev-01").await.unwrap();
    copy.state = LifecycleState::Disabled;
    copy.allowed_services.clear();

    let fresh = registry.get_instance("instance-dev-01").await.unwrap();
    assert_eq!(fresh.state, LifecycleState::Active);
    assert_eq!(fresh.allowed_services.len(), 2);
}

#[tokio::test]
async fn failed_mutations_roll_back_entirely() {
    let (store, _, registry) = setup();
    registry.create_tenant(create_tenant("tenant-acme")).await.unwrap();

    // The duplicate-source failure happens after the tenant check; the
    // transaction must leave no trace of the attempt.
    registry
        .create_instance(create_instance("instance-dev-01", "tenant-acme", "sn://a"))
        .await
        .unwrap();
    let version_before = store.version().await.unwrap();
    registry
        .create_instance(create_instance("instance-dev-02", "tenant-acme", "sn://a"))
        .await
        .unwrap_err();

    let snapshot = store.read().await.unwrap();
    assert_eq!(store.version().await.unwrap(), version_before);
    assert!(!snapshot.instances.contains_key("instance-dev-02"));
}
