//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans [`InventoryEvent`]s out to every subscriber. It is
//! shared as `Arc<EventBus>` between the inventory managers of one process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use testbed_core::inventory::EntityCategory;
use testbed_core::types::{DbId, TenantId};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// InventoryEvent
// ---------------------------------------------------------------------------

/// Something that happened to the administered inventory.
///
/// Lease acquisition and release are not inventory changes and never
/// produce events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEvent {
    /// Dot-separated event name, e.g. `"resource.created"`.
    pub event_type: String,

    pub tenant_id: TenantId,

    /// Entity kind (`"account"` or `"resource"`) and id, when the event is
    /// about a single entity.
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,

    /// Identity of the caller that made the change.
    pub actor: Option<String>,

    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl InventoryEvent {
    pub fn new(event_type: impl Into<String>, tenant_id: TenantId) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id,
            source_entity_type: None,
            source_entity_id: None,
            actor: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// `"<category>.<action>"`, e.g. `entity(Resource, "disabled", ..)` is
    /// `"resource.disabled"`.
    pub fn entity(category: EntityCategory, action: &str, tenant_id: TenantId, id: DbId) -> Self {
        Self::new(format!("{}.{action}", category.as_str()), tenant_id)
            .with_source(category.as_str(), id)
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Use the injected clock's time rather than the wall clock.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use testbed_events::bus::{EventBus, InventoryEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(InventoryEvent::new("resource.created", 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<InventoryEvent>,
}

impl EventBus {
    /// Slow receivers observe `RecvError::Lagged` once `capacity` unread
    /// events have piled up.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: InventoryEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            InventoryEvent::entity(EntityCategory::Resource, "created", 3, 42)
                .with_actor("alice")
                .with_payload(serde_json::json!({"name": "pixel-7"})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "resource.created");
        assert_eq!(received.tenant_id, 3);
        assert_eq!(received.source_entity_type.as_deref(), Some("resource"));
        assert_eq!(received.source_entity_id, Some(42));
        assert_eq!(received.actor.as_deref(), Some("alice"));
        assert_eq!(received.payload["name"], "pixel-7");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(InventoryEvent::new("account.deleted", 1));

        assert_eq!(rx1.recv().await.unwrap().event_type, "account.deleted");
        assert_eq!(rx2.recv().await.unwrap().event_type, "account.deleted");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(InventoryEvent::new("resource.updated", 1));
    }

    #[test]
    fn bare_event_has_empty_optional_fields() {
        let event = InventoryEvent::new("resource.reconciled", 9);
        assert!(event.source_entity_type.is_none());
        assert!(event.source_entity_id.is_none());
        assert!(event.actor.is_none());
        assert!(event.payload.is_object());
    }
}
