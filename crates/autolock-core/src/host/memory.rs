//! In-memory host.
//!
//! Implements [`Host`] well enough to drive a door end to end: entity
//! states, an event bus, the helper services a door creates and toggles,
//! countdown timers backed by tokio tasks, and lock entities whose reaction
//! to `lock.lock` is scripted per entity. Every service call is recorded so
//! tests and the CLI simulation can inspect what a door did.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::bus::{EventBus, Subscription};
use super::{parse_hms, Host};
use crate::clock::{Clock, SystemClock};
use crate::error::HostError;
use crate::events::{EntityState, EventType, HostEvent};
use crate::constants::{LOCK_STATE_LOCKED, LOCK_STATE_UNLOCKED};

/// How a lock entity responds to `lock.lock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockBehavior {
    /// Report `locked` after the given delay (immediately for zero).
    LockAfter(Duration),
    /// Accept the command but never change state.
    Ignore,
    /// Fail the service call with this message.
    Reject(String),
}

impl Default for LockBehavior {
    fn default() -> Self {
        LockBehavior::LockAfter(Duration::from_secs(1))
    }
}

/// One recorded service call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCallRecord {
    pub domain: String,
    pub service: String,
    pub data: Value,
}

impl ServiceCallRecord {
    pub fn is(&self, domain: &str, service: &str) -> bool {
        self.domain == domain && self.service == service
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.data.get("entity_id").and_then(Value::as_str)
    }
}

#[derive(Default)]
struct State {
    entities: HashMap<String, EntityState>,
    calls: Vec<ServiceCallRecord>,
    lock_behaviors: HashMap<String, LockBehavior>,
    failing: HashSet<(String, String)>,
    timers: HashMap<String, JoinHandle<()>>,
    notify_services: Vec<String>,
}

/// Cheaply cloneable handle to a shared in-memory host.
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<State>>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            bus: EventBus::new(),
            clock,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Set an entity's state, publishing `StateChanged` if it changed.
    pub fn set_state(&self, entity_id: &str, new_state: &str) {
        let old_state = {
            let mut state = self.lock();
            let old = state.entities.get(entity_id).map(|e| e.state.clone());
            if old.as_deref() == Some(new_state) {
                return;
            }
            state.entities.insert(
                entity_id.to_string(),
                EntityState {
                    entity_id: entity_id.to_string(),
                    state: new_state.to_string(),
                    last_changed: self.clock.now(),
                },
            );
            old
        };
        trace!(entity_id, ?old_state, new_state, "state changed");
        self.bus.publish(&HostEvent::StateChanged {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: Some(new_state.to_string()),
        });
    }

    /// Forget an entity, publishing a `StateChanged` with no new state.
    pub fn remove_state(&self, entity_id: &str) {
        let removed = self.lock().entities.remove(entity_id);
        if let Some(old) = removed {
            self.bus.publish(&HostEvent::StateChanged {
                entity_id: entity_id.to_string(),
                old_state: Some(old.state),
                new_state: None,
            });
        }
    }

    pub fn state_of(&self, entity_id: &str) -> Option<String> {
        self.lock().entities.get(entity_id).map(|e| e.state.clone())
    }

    pub fn set_lock_behavior(&self, lock_entity: &str, behavior: LockBehavior) {
        self.lock()
            .lock_behaviors
            .insert(lock_entity.to_string(), behavior);
    }

    /// Make every call to `domain.service` fail.
    pub fn fail_service(&self, domain: &str, service: &str) {
        self.lock()
            .failing
            .insert((domain.to_string(), service.to_string()));
    }

    pub fn add_notify_service(&self, name: &str) {
        self.lock().notify_services.push(name.to_string());
    }

    /// All service calls so far, in order.
    pub fn calls(&self) -> Vec<ServiceCallRecord> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, domain: &str, service: &str) -> Vec<ServiceCallRecord> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is(domain, service))
            .cloned()
            .collect()
    }

    /// Persistent notifications created so far.
    pub fn notifications(&self) -> Vec<ServiceCallRecord> {
        self.calls_to("persistent_notification", "create")
    }

    /// Fire a timer immediately, as if its countdown had elapsed.
    pub fn finish_timer(&self, entity_id: &str) {
        if let Some(handle) = self.lock().timers.remove(entity_id) {
            handle.abort();
        }
        self.set_state(entity_id, "idle");
        self.bus.publish(&HostEvent::TimerFinished {
            entity_id: entity_id.to_string(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_timer(&self, entity_id: &str, duration: Duration) {
        self.set_state(entity_id, "active");
        let host = self.clone();
        let id = entity_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Drop our own handle first so finish_timer does not abort us.
            host.lock().timers.remove(&id);
            host.set_state(&id, "idle");
            host.bus.publish(&HostEvent::TimerFinished { entity_id: id });
        });
        if let Some(previous) = self.lock().timers.insert(entity_id.to_string(), handle) {
            previous.abort();
        }
    }

    fn cancel_timer(&self, entity_id: &str) {
        if let Some(handle) = self.lock().timers.remove(entity_id) {
            handle.abort();
        }
        if self.state_of(entity_id).is_some() {
            self.set_state(entity_id, "idle");
        }
    }

    fn lock_entity(&self, entity_id: &str) -> Result<(), String> {
        let behavior = self
            .lock()
            .lock_behaviors
            .get(entity_id)
            .cloned()
            .unwrap_or_default();
        match behavior {
            LockBehavior::LockAfter(delay) if delay.is_zero() => {
                self.set_state(entity_id, LOCK_STATE_LOCKED);
            }
            LockBehavior::LockAfter(delay) => {
                let host = self.clone();
                let id = entity_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    host.set_state(&id, LOCK_STATE_LOCKED);
                });
            }
            LockBehavior::Ignore => {}
            LockBehavior::Reject(message) => return Err(message),
        }
        Ok(())
    }

    fn dispatch(&self, domain: &str, service: &str, data: &Value) -> Result<(), HostError> {
        let invalid = |message: &str| HostError::InvalidData {
            domain: domain.to_string(),
            service: service.to_string(),
            message: message.to_string(),
        };
        let entity_id = move || {
            data.get("entity_id")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing entity_id"))
        };

        match (domain, service) {
            ("input_boolean", "create") => {
                let initial = data.get("initial").and_then(Value::as_bool).unwrap_or(false);
                self.set_state(entity_id()?, if initial { "on" } else { "off" });
            }
            ("input_boolean", "turn_on") => self.set_state(entity_id()?, "on"),
            ("input_boolean", "turn_off") => self.set_state(entity_id()?, "off"),
            ("input_datetime", "create") => self.set_state(entity_id()?, "unknown"),
            ("input_datetime", "set_datetime") => {
                let value = data
                    .get("datetime")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("missing datetime"))?;
                self.set_state(entity_id()?, value);
            }
            ("timer", "create") => self.set_state(entity_id()?, "idle"),
            ("timer", "start") => {
                let raw = data
                    .get("duration")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("missing duration"))?;
                let duration = parse_hms(raw).ok_or_else(|| invalid("duration must be HH:MM:SS"))?;
                self.start_timer(entity_id()?, duration);
            }
            ("timer", "cancel") => self.cancel_timer(entity_id()?),
            ("lock", "lock") => {
                self.lock_entity(entity_id()?)
                    .map_err(|message| HostError::ServiceFailed {
                        domain: domain.to_string(),
                        service: service.to_string(),
                        message,
                    })?;
            }
            ("lock", "unlock") => self.set_state(entity_id()?, LOCK_STATE_UNLOCKED),
            ("persistent_notification", "create") => {}
            ("notify", name) if self.lock().notify_services.iter().any(|s| s == name) => {}
            _ => {
                return Err(HostError::UnknownService {
                    domain: domain.to_string(),
                    service: service.to_string(),
                })
            }
        }
        Ok(())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryHost")
            .field("entities", &state.entities.len())
            .field("calls", &state.calls.len())
            .field("bus", &self.bus)
            .finish()
    }
}

#[async_trait]
impl Host for MemoryHost {
    fn get_state(&self, entity_id: &str) -> Option<EntityState> {
        self.lock().entities.get(entity_id).cloned()
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> Result<(), HostError> {
        debug!(domain, service, %data, "service call");
        let failing = {
            let mut state = self.lock();
            state.calls.push(ServiceCallRecord {
                domain: domain.to_string(),
                service: service.to_string(),
                data: data.clone(),
            });
            state
                .failing
                .contains(&(domain.to_string(), service.to_string()))
        };
        if failing {
            return Err(HostError::ServiceFailed {
                domain: domain.to_string(),
                service: service.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.dispatch(domain, service, &data)
    }

    fn subscribe(
        &self,
        event_type: EventType,
        entity_id: &str,
        tx: UnboundedSender<HostEvent>,
    ) -> Subscription {
        self.bus.subscribe(event_type, entity_id, tx)
    }

    fn notify_services(&self) -> Vec<String> {
        self.lock().notify_services.clone()
    }
}
