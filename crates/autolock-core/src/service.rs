//! Outward-facing commands and the door registry.
//!
//! [`Autolock`] is the composition root: it is built once from a host, a
//! clock and a validated [`AppConfig`], sets up and registers every door,
//! and is the only place doors can be looked up by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{AppConfig, DoorConfig, NotificationsConfig};
use crate::constants::SNOOZE_DURATIONS;
use crate::door::{Door, DoorStatus};
use crate::error::{Result, ServiceError};
use crate::host::Host;
use crate::notifications::NotificationService;
use crate::safety::LockAttemptOutcome;

/// Snooze lengths the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u32")]
pub enum SnoozeDuration {
    Fifteen,
    Thirty,
    Sixty,
}

impl SnoozeDuration {
    pub fn minutes(self) -> u32 {
        match self {
            SnoozeDuration::Fifteen => SNOOZE_DURATIONS[0],
            SnoozeDuration::Thirty => SNOOZE_DURATIONS[1],
            SnoozeDuration::Sixty => SNOOZE_DURATIONS[2],
        }
    }
}

impl TryFrom<u32> for SnoozeDuration {
    type Error = ServiceError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            15 => Ok(SnoozeDuration::Fifteen),
            30 => Ok(SnoozeDuration::Thirty),
            60 => Ok(SnoozeDuration::Sixty),
            other => Err(ServiceError::InvalidSnoozeDuration(other)),
        }
    }
}

impl From<SnoozeDuration> for u32 {
    fn from(duration: SnoozeDuration) -> Self {
        duration.minutes()
    }
}

/// A command addressed to one door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceCall {
    LockNow,
    /// Raw minutes; anything but 15, 30 or 60 is rejected.
    Snooze { minutes: u32 },
    Enable,
    Disable,
}

/// Result of a dispatched [`ServiceCall`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ServiceResponse {
    Locked(LockAttemptOutcome),
    Snoozed {
        until: chrono::DateTime<chrono::FixedOffset>,
    },
    Done,
}

/// Doors by id.
#[derive(Debug, Default)]
pub struct DoorRegistry {
    doors: BTreeMap<String, Door>,
}

impl DoorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`ServiceError::DuplicateDoor`] if the id is taken. The rejected door
    /// is dropped, which unloads it.
    pub fn insert(&mut self, door: Door) -> Result<(), ServiceError> {
        let id = door.id().to_string();
        if self.doors.contains_key(&id) {
            return Err(ServiceError::DuplicateDoor(id));
        }
        self.doors.insert(id, door);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Door> {
        self.doors.remove(id)
    }

    pub fn get(&self, id: &str) -> Result<&Door, ServiceError> {
        self.doors
            .get(id)
            .ok_or_else(|| ServiceError::DoorNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.doors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.doors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Door> {
        self.doors.values()
    }

    fn drain(&mut self) -> Vec<Door> {
        std::mem::take(&mut self.doors).into_values().collect()
    }
}

/// The running integration.
pub struct Autolock {
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    notifier: NotificationService,
    registry: DoorRegistry,
}

impl Autolock {
    /// Build the service and bring up every configured door.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Configuration errors, or a host error while creating a door's helper
    /// entities. Doors already brought up are unloaded when the partially
    /// built service is dropped.
    pub async fn start(
        host: Arc<dyn Host>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut autolock = Self {
            notifier: notifier_for(Arc::clone(&host), &config.notifications),
            host,
            clock,
            registry: DoorRegistry::new(),
        };
        for door in &config.doors {
            autolock.add_door(door.clone()).await?;
        }
        info!(doors = autolock.registry.len(), "autolock started");
        Ok(autolock)
    }

    /// Set up, register and track one more door.
    pub async fn add_door(&mut self, config: DoorConfig) -> Result<()> {
        let id = config.id();
        if self.registry.contains(&id) {
            return Err(ServiceError::DuplicateDoor(id).into());
        }
        let door = Door::new(
            config,
            Arc::clone(&self.host),
            Arc::clone(&self.clock),
            self.notifier.clone(),
        )?;
        door.setup().await?;
        door.register();
        self.registry.insert(door)?;
        Ok(())
    }

    /// Unload and forget a door.
    pub fn remove_door(&mut self, id: &str) -> Result<(), ServiceError> {
        let door = self
            .registry
            .remove(id)
            .ok_or_else(|| ServiceError::DoorNotFound(id.to_string()))?;
        door.unload();
        info!(door = id, "door removed");
        Ok(())
    }

    /// Dispatch a command to the door with `door_id`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::DoorNotFound`], [`ServiceError::InvalidSnoozeDuration`],
    /// or the host error raised while applying the command. A failed
    /// `LockNow` is not an error: it is reported in the returned outcome and
    /// through a notification.
    pub async fn call(
        &self,
        door_id: &str,
        call: ServiceCall,
    ) -> Result<ServiceResponse, ServiceError> {
        let door = self.registry.get(door_id).inspect_err(|e| {
            warn!(door = door_id, ?call, error = %e, "service call rejected");
        })?;

        let response = match call {
            ServiceCall::LockNow => ServiceResponse::Locked(door.lock_now().await),
            ServiceCall::Snooze { minutes } => {
                let duration = SnoozeDuration::try_from(minutes).inspect_err(|e| {
                    warn!(door = door_id, error = %e, "service call rejected");
                })?;
                let until = door.snooze(duration).await?;
                ServiceResponse::Snoozed { until }
            }
            ServiceCall::Enable => {
                door.enable().await?;
                ServiceResponse::Done
            }
            ServiceCall::Disable => {
                door.disable().await?;
                ServiceResponse::Done
            }
        };
        Ok(response)
    }

    pub fn door_status(&self, door_id: &str) -> Result<DoorStatus, ServiceError> {
        Ok(self.registry.get(door_id)?.status())
    }

    pub fn door_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    pub fn door(&self, door_id: &str) -> Result<&Door, ServiceError> {
        self.registry.get(door_id)
    }

    pub fn registry(&self) -> &DoorRegistry {
        &self.registry
    }

    /// Unload every door. Further calls find no doors.
    pub fn shutdown(&mut self) {
        let doors = self.registry.drain();
        let count = doors.len();
        for door in doors {
            door.unload();
        }
        if count > 0 {
            info!(doors = count, "autolock shut down");
        }
    }
}

impl Drop for Autolock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Autolock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autolock")
            .field("registry", &self.registry)
            .finish()
    }
}

fn notifier_for(host: Arc<dyn Host>, config: &NotificationsConfig) -> NotificationService {
    NotificationService::new(host)
        .with_push_target(config.push_target.clone())
        .with_persistent(config.persistent)
}

impl From<SnoozeDuration> for chrono::Duration {
    fn from(duration: SnoozeDuration) -> Self {
        chrono::Duration::minutes(duration.minutes().into())
    }
}
