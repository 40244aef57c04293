//! What starts a door's countdown.
//!
//! With a door sensor configured the countdown starts when the door closes;
//! otherwise it starts when the lock itself reports unlocked. Exactly one
//! source is active per door.

use serde::Serialize;

use crate::constants::{LOCK_STATE_UNLOCKED, SENSOR_STATE_CLOSED};
use crate::events::HostEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "entity_id", rename_all = "snake_case")]
pub enum TriggerSource {
    /// Door sensor transitions to closed.
    Sensor(String),
    /// Lock transitions to unlocked.
    Lock(String),
}

impl TriggerSource {
    /// Sensor takes precedence when one is configured.
    pub fn select(lock_entity: &str, sensor_entity: Option<&str>) -> Self {
        match sensor_entity {
            Some(sensor) => TriggerSource::Sensor(sensor.to_string()),
            None => TriggerSource::Lock(lock_entity.to_string()),
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            TriggerSource::Sensor(id) | TriggerSource::Lock(id) => id,
        }
    }

    /// State string that fires the trigger.
    pub fn target_state(&self) -> &'static str {
        match self {
            TriggerSource::Sensor(_) => SENSOR_STATE_CLOSED,
            TriggerSource::Lock(_) => LOCK_STATE_UNLOCKED,
        }
    }

    /// `event` is a transition of this source's entity *into* the target
    /// state. A repeated report of the same state does not count.
    pub fn matches(&self, event: &HostEvent) -> bool {
        let HostEvent::StateChanged {
            entity_id,
            old_state,
            new_state,
        } = event
        else {
            return false;
        };
        if entity_id != self.entity_id() {
            return false;
        }
        let target = self.target_state();
        new_state.as_deref() == Some(target) && old_state.as_deref() != Some(target)
    }
}
