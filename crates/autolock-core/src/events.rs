use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Event classes a door can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChanged,
    TimerFinished,
}

/// Every signal the host delivers to a door arrives as a HostEvent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// An entity's state string changed.
    StateChanged {
        entity_id: String,
        old_state: Option<String>,
        /// `None` when the entity was removed.
        new_state: Option<String>,
    },
    /// A countdown timer entity ran to completion.
    TimerFinished { entity_id: String },
}

impl HostEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            HostEvent::StateChanged { .. } => EventType::StateChanged,
            HostEvent::TimerFinished { .. } => EventType::TimerFinished,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            HostEvent::StateChanged { entity_id, .. } | HostEvent::TimerFinished { entity_id } => {
                entity_id
            }
        }
    }
}

/// A host entity's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    pub last_changed: DateTime<FixedOffset>,
}

impl EntityState {
    /// State string is neither `unknown` nor `unavailable`.
    pub fn is_available(&self) -> bool {
        !matches!(self.state.as_str(), "unknown" | "unavailable" | "")
    }
}
