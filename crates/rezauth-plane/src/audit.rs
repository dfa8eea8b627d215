//! Audit recorder — append and query the event stream.

use rezauth_core::clock::Clock;
use rezauth_core::error::CoreResult;
use rezauth_core::models::audit::{AuditEvent, CreateAuditEvent, CrossServiceEvent, RedactionPolicy};
use rezauth_core::store::SnapshotStore;
use uuid::Uuid;

/// Records audit events and serves them back in replay order.
///
/// Services append their own events inside the transaction that
/// produced them; this recorder covers standalone producers (thin
/// audit-only endpoints) and the read side.
#[derive(Clone)]
pub struct AuditRecorder<S: SnapshotStore, C: Clock> {
    store: S,
    clock: C,
    policy: RedactionPolicy,
}

impl<S: SnapshotStore, C: Clock> AuditRecorder<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self::with_policy(store, clock, RedactionPolicy::default())
    }

    pub fn with_policy(store: S, clock: C, policy: RedactionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Append one event, filling in identity and time and sanitizing
    /// metadata. Store failures propagate; nothing is dropped silently.
    pub async fn record(&self, input: CreateAuditEvent) -> CoreResult<AuditEvent> {
        let occurred_at = self.clock.now();
        self.store
            .mutate(|snap| {
                let event = AuditEvent::record(input, Uuid::new_v4(), occurred_at, &self.policy);
                snap.append_audit(event.clone());
                Ok(event)
            })
            .await
    }

    /// Events ascending by `occurred_at`; the last `limit` if given.
    pub async fn list(&self, limit: Option<usize>) -> CoreResult<Vec<AuditEvent>> {
        let snapshot = self.store.read().await?;
        let mut events = snapshot.audit_events;
        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(tail(events, limit))
    }

    /// Normalized events in replay order (`occurred_at`, then
    /// `event_id`); the last `limit` if given.
    pub async fn list_cross_service(
        &self,
        limit: Option<usize>,
    ) -> CoreResult<Vec<CrossServiceEvent>> {
        let snapshot = self.store.read().await?;
        let mut events = snapshot.cross_service_events;
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(tail(events, limit))
    }
}

fn tail<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit
        && items.len() > limit
    {
        items.drain(..items.len() - limit);
    }
    items
}
