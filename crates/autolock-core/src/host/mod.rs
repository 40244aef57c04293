//! The home-automation host as seen from a door.
//!
//! The host owns entity state, dispatches service calls and delivers
//! events. Autolock never caches anything it can ask the host for: enabled,
//! snoozed and countdown state are all read back through [`Host::get_state`]
//! whenever a decision needs them.

pub mod bus;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::HostError;
use crate::events::{EntityState, EventType, HostEvent};

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use memory::{LockBehavior, MemoryHost, ServiceCallRecord};

/// Capabilities the core consumes from the host platform.
#[async_trait]
pub trait Host: Send + Sync {
    /// Current state of an entity, `None` when the host does not know it.
    fn get_state(&self, entity_id: &str) -> Option<EntityState>;

    /// Fire a service call. May fail; callers decide what a failure means.
    async fn call_service(&self, domain: &str, service: &str, data: Value)
        -> Result<(), HostError>;

    /// Register `tx` for events of `event_type` concerning `entity_id`.
    fn subscribe(
        &self,
        event_type: EventType,
        entity_id: &str,
        tx: UnboundedSender<HostEvent>,
    ) -> Subscription;

    /// Names of the `notify.*` services currently available.
    fn notify_services(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Domain part of an entity id (`lock.front_door` -> `lock`).
pub fn entity_domain(entity_id: &str) -> Option<&str> {
    let (domain, object_id) = entity_id.split_once('.')?;
    if domain.is_empty() || object_id.is_empty() {
        return None;
    }
    Some(domain)
}

/// Entity id is `<domain>.<object_id>` using lowercase ascii, digits and `_`.
pub fn is_valid_entity_id(entity_id: &str) -> bool {
    let Some((domain, object_id)) = entity_id.split_once('.') else {
        return false;
    };
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    valid_part(domain) && valid_part(object_id)
}

/// `{"entity_id": id}` service data.
pub fn entity_data(entity_id: &str) -> Value {
    json!({ "entity_id": entity_id })
}

/// Render a minute count as the host's `HH:MM:SS` duration string.
pub fn format_hms(minutes: u32) -> String {
    format!("{:02}:{:02}:00", minutes / 60, minutes % 60)
}

/// Parse an `HH:MM:SS` duration string.
pub fn parse_hms(value: &str) -> Option<Duration> {
    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}
