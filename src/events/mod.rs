//! Event Broadcaster (C11).
//!
//! Fire-and-forget per workspace; if the transport is unavailable, log and
//! continue — a broadcast failure must never fail the enclosing operation
//! (§4.9). Grounded in the teacher's `enterprise/eventsource` trait-object
//! manager shape, narrowed to the single `publish` method this system needs.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SbomUploaded,
    SbomDeleted,
    DocumentUploaded,
    ReleaseCreated,
    ReleaseUpdated,
    ReleaseDeleted,
    AccessRequestUpdated,
}

#[derive(Debug, Serialize)]
pub struct Event {
    pub workspace_id: Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, event: Event);
}

/// Logs every event and otherwise does nothing. Swapped for a real
/// transport (websocket fanout, message queue) without touching callers,
/// since every call site only ever sees the trait object.
pub struct LoggingBroadcaster;

#[async_trait]
impl Broadcaster for LoggingBroadcaster {
    async fn publish(&self, event: Event) {
        tracing::info!(
            workspace_id = %event.workspace_id,
            kind = ?event.kind,
            "event broadcast"
        );
    }
}

/// Convenience for call sites that only have a `&dyn Broadcaster` and want
/// to fire-and-forget without awaiting the publish to complete.
pub async fn broadcast(broadcaster: &dyn Broadcaster, workspace_id: Uuid, kind: EventKind, payload: serde_json::Value) {
    broadcaster.publish(Event { workspace_id, kind, payload }).await;
}
