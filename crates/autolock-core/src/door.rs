//! Per-door orchestration.
//!
//! A [`Door`] wires the schedule, retry and safety pieces to host events:
//!
//! 1. the trigger entity transitions (sensor closes, or lock unlocks)
//! 2. enabled and snooze helpers are read back from the host
//! 3. any running countdown is cancelled and a new one started for the
//!    day or night delay
//! 4. when the countdown timer finishes, lock attempts run under the
//!    door's retry policy
//! 5. if every attempt fails, one notification is sent
//!
//! Events for one door are handled strictly in arrival order by a single
//! task, including every retry sleep. Doors never share state with each
//! other.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::config::DoorConfig;
use crate::constants::{
    door_template, ENABLED_STATE_ON, ENABLED_TEMPLATE, SNOOZE_TEMPLATE, TIMER_STATE_ACTIVE,
    TIMER_TEMPLATE,
};
use crate::error::{ConfigError, HostError, LockError};
use crate::events::{EventType, HostEvent};
use crate::host::{entity_data, format_hms, Host, Subscription};
use crate::notifications::NotificationService;
use crate::retry::{execute_with_retry_if, RetryOutcome, RetryPolicy};
use crate::safety::{LockAttemptOutcome, SafetyValidator};
use crate::schedule::{delay_for, is_night_time, DelayPolicy, ScheduleWindow};
use crate::service::SnoozeDuration;
use crate::trigger::TriggerSource;

/// Helper entity ids owned by one door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoorEntities {
    pub enabled: String,
    pub snooze_until: String,
    pub timer: String,
}

impl DoorEntities {
    pub fn for_door(door_id: &str) -> Self {
        Self {
            enabled: door_template(ENABLED_TEMPLATE, door_id),
            snooze_until: door_template(SNOOZE_TEMPLATE, door_id),
            timer: door_template(TIMER_TEMPLATE, door_id),
        }
    }
}

/// What a trigger event led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    Disabled,
    Snoozed { until: DateTime<FixedOffset> },
    CountdownStarted { minutes: u32, night: bool },
}

/// Snapshot of a door's runtime state, read from the host on demand.
#[derive(Debug, Clone, Serialize)]
pub struct DoorStatus {
    pub door_id: String,
    pub name: String,
    pub enabled: bool,
    pub snoozed_until: Option<DateTime<FixedOffset>>,
    pub snoozed: bool,
    pub countdown_active: bool,
    pub lock_state: Option<String>,
    pub trigger: TriggerSource,
}

struct DoorContext {
    id: String,
    config: DoorConfig,
    window: Option<ScheduleWindow>,
    delay_policy: DelayPolicy,
    retry_policy: RetryPolicy,
    entities: DoorEntities,
    trigger: TriggerSource,
    host: Arc<dyn Host>,
    clock: Arc<dyn Clock>,
    safety: SafetyValidator,
    notifier: NotificationService,
}

/// One configured door.
pub struct Door {
    ctx: Arc<DoorContext>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Door {
    /// Build a door from validated configuration.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from [`DoorConfig::validate`]; policies are parsed
    /// here once and held for the door's lifetime.
    pub fn new(
        config: DoorConfig,
        host: Arc<dyn Host>,
        clock: Arc<dyn Clock>,
        notifier: NotificationService,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let id = config.id();
        let ctx = DoorContext {
            window: config.window()?,
            delay_policy: config.delay_policy(),
            retry_policy: config.retry_policy(),
            entities: DoorEntities::for_door(&id),
            trigger: TriggerSource::select(&config.lock_entity, config.sensor_entity.as_deref()),
            safety: SafetyValidator::new(Arc::clone(&host)),
            id,
            config,
            host,
            clock,
            notifier,
        };
        Ok(Self {
            ctx: Arc::new(ctx),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.ctx.id
    }

    pub fn name(&self) -> &str {
        &self.ctx.config.name
    }

    pub fn config(&self) -> &DoorConfig {
        &self.ctx.config
    }

    pub fn entities(&self) -> &DoorEntities {
        &self.ctx.entities
    }

    pub fn trigger(&self) -> &TriggerSource {
        &self.ctx.trigger
    }

    /// Create missing helper entities. Existing helpers are left as they are.
    ///
    /// # Errors
    ///
    /// The first [`HostError`] raised by a create call.
    pub async fn setup(&self) -> Result<(), HostError> {
        let ctx = &self.ctx;
        info!(door = %ctx.id, name = %ctx.config.name, "setting up door");

        if ctx.host.get_state(&ctx.config.lock_entity).is_none() {
            warn!(door = %ctx.id, lock = %ctx.config.lock_entity, "lock entity not found");
        }
        if let Some(sensor) = &ctx.config.sensor_entity {
            if ctx.host.get_state(sensor).is_none() {
                warn!(door = %ctx.id, sensor = %sensor, "sensor entity not found");
            }
        }

        let name = &ctx.config.name;
        ctx.ensure_helper(
            "input_boolean",
            &ctx.entities.enabled,
            json!({
                "entity_id": ctx.entities.enabled,
                "name": format!("{name} AutoLock Enabled"),
                "initial": ctx.config.enable_on_creation,
            }),
        )
        .await?;
        ctx.ensure_helper(
            "input_datetime",
            &ctx.entities.snooze_until,
            json!({
                "entity_id": ctx.entities.snooze_until,
                "name": format!("{name} AutoLock Snooze"),
                "has_date": true,
                "has_time": true,
            }),
        )
        .await?;
        ctx.ensure_helper(
            "timer",
            &ctx.entities.timer,
            json!({
                "entity_id": ctx.entities.timer,
                "name": format!("{name} AutoLock Delay"),
            }),
        )
        .await?;

        debug!(door = %ctx.id, "door setup complete");
        Ok(())
    }

    /// Subscribe to the trigger entity and the countdown timer and start the
    /// door's event task. Calling it again while registered does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self) {
        let mut subscriptions = self.lock_subscriptions();
        if !subscriptions.is_empty() {
            return;
        }

        let ctx = &self.ctx;
        let (tx, rx) = mpsc::unbounded_channel();
        subscriptions.push(ctx.host.subscribe(
            EventType::StateChanged,
            ctx.trigger.entity_id(),
            tx.clone(),
        ));
        subscriptions.push(ctx.host.subscribe(EventType::TimerFinished, &ctx.entities.timer, tx));

        debug!(door = %ctx.id, trigger = ?ctx.trigger, "listeners registered");
        tokio::spawn(run_events(Arc::clone(ctx), rx));
    }

    pub fn is_registered(&self) -> bool {
        !self.lock_subscriptions().is_empty()
    }

    /// Handle a trigger as if the trigger entity had just transitioned.
    pub async fn handle_trigger(&self) -> Result<TriggerDecision, HostError> {
        self.ctx.handle_trigger().await
    }

    /// Run the retried lock sequence as if the countdown had finished.
    pub async fn lock_door(&self) -> RetryOutcome<(), LockError> {
        self.ctx.lock_door().await
    }

    /// Lock immediately: one attempt, no countdown, no retries.
    pub async fn lock_now(&self) -> LockAttemptOutcome {
        let ctx = &self.ctx;
        info!(door = %ctx.id, "manual lock requested");
        let outcome = ctx
            .safety
            .lock_with_verification(
                &ctx.config.lock_entity,
                ctx.config.verification_delay(),
                ctx.config.sensor_entity.as_deref(),
            )
            .await;

        match &outcome.error {
            None => info!(door = %ctx.id, "manual lock successful"),
            Some(LockError::AlreadyLocked) => info!(door = %ctx.id, "door already locked"),
            Some(err) => {
                error!(door = %ctx.id, error = %err, "manual lock failed");
                ctx.notifier
                    .notify_manual_failure(
                        &ctx.id,
                        &ctx.config.name,
                        &ctx.config.lock_entity,
                        &err.to_string(),
                    )
                    .await;
            }
        }
        outcome
    }

    /// Suppress triggers until now + `duration`. Returns the stored time.
    pub async fn snooze(
        &self,
        duration: SnoozeDuration,
    ) -> Result<DateTime<FixedOffset>, HostError> {
        let ctx = &self.ctx;
        let until = ctx.clock.now() + chrono::Duration::from(duration);
        ctx.host
            .call_service(
                "input_datetime",
                "set_datetime",
                json!({
                    "entity_id": ctx.entities.snooze_until,
                    "datetime": until.to_rfc3339_opts(SecondsFormat::Secs, false),
                }),
            )
            .await?;
        info!(door = %ctx.id, minutes = duration.minutes(), %until, "door snoozed");
        Ok(until)
    }

    pub async fn enable(&self) -> Result<(), HostError> {
        self.set_enabled(true).await
    }

    pub async fn disable(&self) -> Result<(), HostError> {
        self.set_enabled(false).await
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), HostError> {
        let ctx = &self.ctx;
        let service = if enabled { "turn_on" } else { "turn_off" };
        ctx.host
            .call_service("input_boolean", service, entity_data(&ctx.entities.enabled))
            .await?;
        info!(door = %ctx.id, enabled, "door enabled state changed");
        Ok(())
    }

    pub fn status(&self) -> DoorStatus {
        let ctx = &self.ctx;
        let now = ctx.clock.now();
        let snoozed_until = ctx.snoozed_until(now.offset());
        DoorStatus {
            door_id: ctx.id.clone(),
            name: ctx.config.name.clone(),
            enabled: ctx.is_enabled(),
            snoozed: snoozed_until.is_some_and(|until| until > now),
            snoozed_until,
            countdown_active: ctx
                .host
                .get_state(&ctx.entities.timer)
                .is_some_and(|s| s.state == TIMER_STATE_ACTIVE),
            lock_state: ctx
                .host
                .get_state(&ctx.config.lock_entity)
                .map(|s| s.state),
            trigger: ctx.trigger.clone(),
        }
    }

    /// Drop every event subscription. Safe to call repeatedly.
    ///
    /// A lock sequence already running finishes on its own; nothing new is
    /// delivered afterwards.
    pub fn unload(&self) {
        let drained: Vec<Subscription> = self.lock_subscriptions().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        for mut subscription in drained {
            subscription.unsubscribe();
        }
        info!(door = %self.ctx.id, "door unloaded");
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Door")
            .field("id", &self.ctx.id)
            .field("trigger", &self.ctx.trigger)
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl Drop for Door {
    fn drop(&mut self) {
        self.unload();
    }
}

async fn run_events(ctx: Arc<DoorContext>, mut rx: UnboundedReceiver<HostEvent>) {
    while let Some(event) = rx.recv().await {
        ctx.handle_event(&event).await;
    }
    debug!(door = %ctx.id, "event task stopped");
}

impl DoorContext {
    async fn ensure_helper(
        &self,
        domain: &str,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<(), HostError> {
        if self.host.get_state(entity_id).is_some() {
            trace!(door = %self.id, entity_id, "helper already exists");
            return Ok(());
        }
        self.host.call_service(domain, "create", data).await?;
        debug!(door = %self.id, entity_id, "helper created");
        Ok(())
    }

    async fn handle_event(&self, event: &HostEvent) {
        match event {
            HostEvent::TimerFinished { entity_id } if *entity_id == self.entities.timer => {
                info!(door = %self.id, "countdown finished");
                self.lock_door().await;
            }
            _ if self.trigger.matches(event) => {
                if let Err(e) = self.handle_trigger().await {
                    error!(door = %self.id, error = %e, "failed to start countdown");
                }
            }
            _ => trace!(door = %self.id, ?event, "event ignored"),
        }
    }

    async fn handle_trigger(&self) -> Result<TriggerDecision, HostError> {
        debug!(door = %self.id, "trigger event");

        if !self.is_enabled() {
            debug!(door = %self.id, "door is disabled");
            return Ok(TriggerDecision::Disabled);
        }

        let now = self.clock.now();
        if let Some(until) = self.snoozed_until(now.offset()) {
            if until > now {
                debug!(door = %self.id, %until, "door is snoozed");
                return Ok(TriggerDecision::Snoozed { until });
            }
        }

        self.host
            .call_service("timer", "cancel", entity_data(&self.entities.timer))
            .await?;

        let night = self
            .window
            .as_ref()
            .is_some_and(|window| is_night_time(&now, window));
        let minutes = delay_for(&now, &self.delay_policy, self.window.as_ref());
        self.host
            .call_service(
                "timer",
                "start",
                json!({ "entity_id": self.entities.timer, "duration": format_hms(minutes) }),
            )
            .await?;

        info!(door = %self.id, minutes, night, "countdown started");
        Ok(TriggerDecision::CountdownStarted { minutes, night })
    }

    async fn lock_door(&self) -> RetryOutcome<(), LockError> {
        let safety = &self.safety;
        let lock = self.config.lock_entity.as_str();
        let sensor = self.config.sensor_entity.as_deref();
        let verification_delay = self.config.verification_delay();

        let outcome = execute_with_retry_if(
            move || async move {
                safety
                    .lock_with_verification(lock, verification_delay, sensor)
                    .await
                    .into_result()
            },
            &self.retry_policy,
            LockError::is_retryable,
        )
        .await;

        match outcome.last_error() {
            None => info!(door = %self.id, attempts = outcome.attempts, "door locked"),
            Some(LockError::AlreadyLocked) => {
                info!(door = %self.id, "door already locked, nothing to do")
            }
            Some(err) => {
                error!(
                    door = %self.id,
                    lock,
                    attempts = outcome.attempts,
                    precondition = err.is_precondition(),
                    error = %err,
                    "auto-lock failed"
                );
                self.notifier
                    .notify_autolock_failure(&self.id, &self.config.name, lock, &err.to_string())
                    .await;
            }
        }
        outcome
    }

    fn is_enabled(&self) -> bool {
        self.host
            .get_state(&self.entities.enabled)
            .is_some_and(|s| s.state == ENABLED_STATE_ON)
    }

    /// Stored snooze time. Unset, unavailable and unparsable values all read
    /// as not snoozed.
    fn snoozed_until(&self, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
        let state = self.host.get_state(&self.entities.snooze_until)?;
        if !state.is_available() {
            return None;
        }
        let parsed = parse_snooze(&state.state, offset);
        if parsed.is_none() {
            warn!(door = %self.id, value = %state.state, "unparsable snooze value, ignoring");
        }
        parsed
    }
}

/// Parse a stored snooze time. Values without an offset are read in
/// `offset`.
pub fn parse_snooze(value: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{LockBehavior, MemoryHost};
    use std::time::Duration;

    const LOCK: &str = "lock.front_door";
    const SENSOR: &str = "binary_sensor.front_door";

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 14, h, m, 0)
            .unwrap()
    }

    fn front_door() -> DoorConfig {
        let mut config = DoorConfig::new("Front Door", LOCK);
        config.night_start = Some("22:00".into());
        config.night_end = Some("06:00".into());
        config.retry_delay = 3;
        config.verification_delay = 2;
        config
    }

    async fn build(config: DoorConfig, clock: Arc<ManualClock>) -> (MemoryHost, Door) {
        let host = MemoryHost::with_clock(clock.clone());
        host.set_state(LOCK, "unlocked");
        let shared: Arc<dyn Host> = Arc::new(host.clone());
        let door = Door::new(
            config,
            Arc::clone(&shared),
            clock,
            NotificationService::new(shared),
        )
        .unwrap();
        door.setup().await.unwrap();
        (host, door)
    }

    fn timer_durations(host: &MemoryHost) -> Vec<String> {
        host.calls_to("timer", "start")
            .iter()
            .map(|c| c.data["duration"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_setup_creates_missing_helpers_once() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let (host, door) = build(front_door(), clock).await;

        assert_eq!(door.id(), "front_door");
        assert_eq!(host.state_of("input_boolean.autolock_front_door_enabled").as_deref(), Some("on"));
        assert_eq!(
            host.state_of("input_datetime.autolock_front_door_snooze_until").as_deref(),
            Some("unknown")
        );
        assert_eq!(host.state_of("timer.autolock_front_door_delay").as_deref(), Some("idle"));

        let calls_before = host.calls().len();
        door.setup().await.unwrap();
        assert_eq!(host.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_setup_honours_enable_on_creation() {
        let mut config = front_door();
        config.enable_on_creation = false;
        let (host, door) = build(config, Arc::new(ManualClock::new(at(12, 0)))).await;

        assert_eq!(host.state_of(&door.entities().enabled).as_deref(), Some("off"));
        assert_eq!(door.handle_trigger().await.unwrap(), TriggerDecision::Disabled);
        assert!(host.calls_to("timer", "start").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_night_trigger_uses_night_delay() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(23, 0)))).await;

        let decision = door.handle_trigger().await.unwrap();
        assert_eq!(decision, TriggerDecision::CountdownStarted { minutes: 2, night: true });
        assert_eq!(timer_durations(&host), vec!["00:02:00"]);

        // cancel precedes start
        let calls = host.calls();
        let cancel = calls.iter().position(|c| c.is("timer", "cancel")).unwrap();
        let start = calls.iter().position(|c| c.is("timer", "start")).unwrap();
        assert!(cancel < start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_trigger_uses_day_delay() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;

        let decision = door.handle_trigger().await.unwrap();
        assert_eq!(decision, TriggerDecision::CountdownStarted { minutes: 5, night: false });
        assert_eq!(timer_durations(&host), vec!["00:05:00"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_day_delay_formats_hours() {
        let mut config = front_door();
        config.day_delay = 90;
        let (host, door) = build(config, Arc::new(ManualClock::new(at(12, 0)))).await;

        door.handle_trigger().await.unwrap();
        assert_eq!(timer_durations(&host), vec!["01:30:00"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snooze_suppresses_until_expired() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let (host, door) = build(front_door(), clock.clone()).await;

        let until = door.snooze(SnoozeDuration::Thirty).await.unwrap();
        assert_eq!(until, at(12, 30));
        assert_eq!(
            host.state_of(&door.entities().snooze_until).as_deref(),
            Some("2026-03-14T12:30:00+01:00")
        );

        assert_eq!(
            door.handle_trigger().await.unwrap(),
            TriggerDecision::Snoozed { until }
        );
        assert!(host.calls_to("timer", "start").is_empty());

        clock.advance(chrono::Duration::minutes(31));
        assert!(matches!(
            door.handle_trigger().await.unwrap(),
            TriggerDecision::CountdownStarted { minutes: 5, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_snooze_fails_open() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_state(&door.entities().snooze_until, "next tuesday");

        assert!(matches!(
            door.handle_trigger().await.unwrap(),
            TriggerDecision::CountdownStarted { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_naive_snooze_read_in_local_offset() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_state(&door.entities().snooze_until, "2026-03-14 12:45:00");

        assert_eq!(
            door.handle_trigger().await.unwrap(),
            TriggerDecision::Snoozed { until: at(12, 45) }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_failures_exhaust_retries_then_notify_once() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_lock_behavior(LOCK, LockBehavior::Reject("cloud auth expired".into()));

        let outcome = door.lock_door().await;

        assert_eq!(outcome.attempts, 4);
        assert!(matches!(outcome.last_error(), Some(LockError::CommandFailed(_))));
        assert_eq!(host.calls_to("lock", "lock").len(), 4);
        let notes = host.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].data["title"], "AutoLock Failed: Front Door");
        assert_eq!(notes[0].data["notification_id"], "autolock_front_door_failure");
        assert!(notes[0].data["message"]
            .as_str()
            .unwrap()
            .contains("cloud auth expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verification_timeouts_are_retried() {
        let mut config = front_door();
        config.retry_count = 1;
        let (host, door) = build(config, Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_lock_behavior(LOCK, LockBehavior::Ignore);

        let outcome = door.lock_door().await;
        assert_eq!(outcome.attempts, 2);
        assert!(matches!(
            outcome.last_error(),
            Some(LockError::VerificationTimeout { .. })
        ));
        assert_eq!(host.notifications().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_locked_stops_without_notification() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_state(LOCK, "locked");

        let outcome = door.lock_door().await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.last_error(), Some(&LockError::AlreadyLocked));
        assert!(host.calls_to("lock", "lock").is_empty());
        assert!(host.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_lock_stops_and_notifies() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.remove_state(LOCK);

        let outcome = door.lock_door().await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(host.notifications().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_door_consumes_every_attempt() {
        let mut config = front_door();
        config.sensor_entity = Some(SENSOR.into());
        let (host, door) = build(config, Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_state(SENSOR, "off");

        let outcome = door.lock_door().await;
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.last_error(), Some(&LockError::DoorOpen));
        assert!(host.calls_to("lock", "lock").is_empty());
        assert_eq!(host.notifications().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_succeeds_first_attempt() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;

        let outcome = door.lock_door().await;
        assert!(outcome.success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(host.state_of(LOCK).as_deref(), Some("locked"));
        assert!(host.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_failure_is_contained() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_lock_behavior(LOCK, LockBehavior::Reject("offline".into()));
        host.fail_service("persistent_notification", "create");

        let outcome = door.lock_door().await;
        assert!(!outcome.success());
        assert_eq!(host.notifications().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_drive_full_cycle() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_state(LOCK, "locked");
        door.register();
        assert!(door.is_registered());

        // lock trigger: unlocking starts the countdown
        host.set_state(LOCK, "unlocked");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(host.state_of(&door.entities().timer).as_deref(), Some("active"));
        assert!(door.status().countdown_active);

        tokio::time::sleep(Duration::from_secs(5 * 60 + 30)).await;
        assert_eq!(host.state_of(LOCK).as_deref(), Some("locked"));
        assert_eq!(host.calls_to("lock", "lock").len(), 1);
        assert!(host.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_trigger_ignores_lock_changes() {
        let mut config = front_door();
        config.sensor_entity = Some(SENSOR.into());
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let (host, door) = build(config, clock).await;
        host.set_state(SENSOR, "off");
        door.register();

        host.set_state(LOCK, "locked");
        host.set_state(LOCK, "unlocked");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(host.calls_to("timer", "start").is_empty());

        host.set_state(SENSOR, "on");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(timer_durations(&host), vec!["00:05:00"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unload_is_idempotent_and_stops_events() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_state(LOCK, "locked");
        door.register();
        assert_eq!(host.bus().listener_count(), 2);

        door.unload();
        door.unload();
        assert!(!door.is_registered());
        assert_eq!(host.bus().listener_count(), 0);

        host.set_state(LOCK, "unlocked");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(host.calls_to("timer", "start").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_now_failure_sends_manual_notification() {
        let (host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;
        host.set_lock_behavior(LOCK, LockBehavior::Reject("jammed".into()));

        let outcome = door.lock_now().await;
        assert!(!outcome.is_verified());
        assert_eq!(host.calls_to("lock", "lock").len(), 1);
        let notes = host.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].data["title"], "Manual Lock Failed: Front Door");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reads_host_state() {
        let (_host, door) = build(front_door(), Arc::new(ManualClock::new(at(12, 0)))).await;

        door.disable().await.unwrap();
        door.snooze(SnoozeDuration::Fifteen).await.unwrap();
        let status = door.status();

        assert!(!status.enabled);
        assert!(status.snoozed);
        assert_eq!(status.snoozed_until, Some(at(12, 15)));
        assert!(!status.countdown_active);
        assert_eq!(status.lock_state.as_deref(), Some("unlocked"));

        door.enable().await.unwrap();
        assert!(door.status().enabled);
    }

    #[test]
    fn test_parse_snooze_formats() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(parse_snooze("2026-03-14T12:30:00+01:00", &offset), Some(at(12, 30)));
        assert_eq!(parse_snooze("2026-03-14 12:30:00", &offset), Some(at(12, 30)));
        assert_eq!(parse_snooze("2026-03-14T12:30:00", &offset), Some(at(12, 30)));
        assert_eq!(parse_snooze("12:30", &offset), None);
    }

    #[test]
    fn test_parse_snooze_fractional_seconds() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        let expected = Some(at(12, 30) + chrono::Duration::milliseconds(500));
        assert_eq!(parse_snooze("2026-03-14T12:30:00.5", &offset), expected);
        assert_eq!(parse_snooze("2026-03-14 12:30:00.500000", &offset), expected);
    }
}
