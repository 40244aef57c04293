//! Subscription registry keyed by (event type, entity id).
//!
//! Listeners are channel senders rather than closures: publishing pushes the
//! event onto every matching channel and the receiving door task processes
//! it in order. Each subscription hands back a [`Subscription`] handle that
//! removes the registration on `unsubscribe()` or when dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::events::{EventType, HostEvent};

/// Identifier of one registration on the bus.
pub type SubscriptionId = u64;

type Key = (EventType, String);

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    listeners: HashMap<Key, Vec<(SubscriptionId, UnboundedSender<HostEvent>)>>,
}

impl Registry {
    fn remove(&mut self, key: &Key, id: SubscriptionId) -> bool {
        let Some(entries) = self.listeners.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(sid, _)| *sid != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(key);
        }
        removed
    }
}

/// Event bus shared between a host and its subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` for events of `event_type` about `entity_id`.
    pub fn subscribe(
        &self,
        event_type: EventType,
        entity_id: &str,
        tx: UnboundedSender<HostEvent>,
    ) -> Subscription {
        let key = (event_type, entity_id.to_string());
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.entry(key.clone()).or_default().push((id, tx));
        debug!(id, ?event_type, entity_id, "subscription registered");

        Subscription {
            id,
            key,
            bus: Some(Arc::downgrade(&self.inner)),
        }
    }

    /// Deliver `event` to every matching listener. Returns how many
    /// listeners received it; closed channels are pruned.
    pub fn publish(&self, event: &HostEvent) -> usize {
        let key = (event.event_type(), event.entity_id().to_string());
        let mut registry = self.registry();
        let Some(entries) = registry.listeners.get_mut(&key) else {
            return 0;
        };

        entries.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0;
        for (_, tx) in entries.iter() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        if entries.is_empty() {
            registry.listeners.remove(&key);
        }
        delivered
    }

    /// Number of live registrations across all keys.
    pub fn listener_count(&self) -> usize {
        self.registry().listeners.values().map(Vec::len).sum()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Disposable handle for one bus registration.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    key: Key,
    bus: Option<Weak<Mutex<Registry>>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.key.0
    }

    pub fn entity_id(&self) -> &str {
        &self.key.1
    }

    pub fn is_active(&self) -> bool {
        self.bus.is_some()
    }

    /// Remove the registration. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        let Some(bus) = self.bus.take() else {
            return;
        };
        if let Some(inner) = bus.upgrade() {
            let mut registry = inner.lock().unwrap_or_else(|e| e.into_inner());
            if registry.remove(&self.key, self.id) {
                debug!(id = self.id, entity_id = %self.key.1, "subscription removed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
