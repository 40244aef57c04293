//! Simulated door cycle.
//!
//! Builds an in-memory host, brings up one configured door through the same
//! service root a real integration uses, fires its trigger and lets the
//! countdown and lock attempts play out on a paused tokio clock. The result
//! is printed as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autolock_core::safety::VERIFY_TIMEOUT;
use autolock_core::{
    delay_for, parse_time_string, AppConfig, Autolock, DoorConfig, Host, LockBehavior,
    ManualClock, MemoryHost, TriggerSource,
};
use chrono::{DateTime, FixedOffset, Local, TimeZone};
use clap::{Args, ValueEnum};
use serde_json::json;

use super::{find_door, load_config};

#[derive(Args)]
pub struct SimulateArgs {
    /// Door id
    #[arg(long)]
    door: String,
    /// Time of day the trigger fires (HH:MM, defaults to now)
    #[arg(long)]
    at: Option<String>,
    /// How the lock reacts to the lock command
    #[arg(long, value_enum, default_value_t = LockMode::Immediate)]
    lock: LockMode,
    /// Reopen the door right after it closes (needs a sensor)
    #[arg(long)]
    door_open: bool,
    /// Config file (defaults to $AUTOLOCK_CONFIG or ~/.config/autolock/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LockMode {
    /// Locks as soon as commanded
    Immediate,
    /// Locks a few seconds after the verification delay
    Slow,
    /// Accepts the command but never locks
    Stuck,
    /// Fails the lock command
    Reject,
}

impl LockMode {
    fn behavior(self, door: &DoorConfig) -> LockBehavior {
        match self {
            LockMode::Immediate => LockBehavior::LockAfter(Duration::ZERO),
            LockMode::Slow => LockBehavior::LockAfter(
                door.verification_delay() + Duration::from_secs(3),
            ),
            LockMode::Stuck => LockBehavior::Ignore,
            LockMode::Reject => LockBehavior::Reject("simulated lock rejection".to_string()),
        }
    }
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    let door = find_door(&config, &args.door)?.clone();
    if args.door_open && door.sensor_entity.is_none() {
        return Err(format!("door {} has no sensor; --door-open needs one", door.id()).into());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()?;
    let report = runtime.block_on(simulate(&config, door, &args))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate(
    config: &AppConfig,
    door: DoorConfig,
    args: &SimulateArgs,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let now = Local::now().fixed_offset();
    let start = match &args.at {
        Some(at) => {
            let time = parse_time_string(at)?;
            now.offset()
                .from_local_datetime(&now.date_naive().and_time(time))
                .single()
                .ok_or("trigger time does not exist in the local offset")?
        }
        None => now,
    };

    let clock = Arc::new(ManualClock::new(start));
    let host = MemoryHost::with_clock(clock.clone());
    host.set_state(&door.lock_entity, "locked");
    host.set_lock_behavior(&door.lock_entity, args.lock.behavior(&door));
    if let Some(sensor) = &door.sensor_entity {
        host.set_state(sensor, "off");
    }

    let single = AppConfig {
        doors: vec![door.clone()],
        notifications: config.notifications.clone(),
    };
    let shared: Arc<dyn Host> = Arc::new(host.clone());
    let mut autolock = Autolock::start(shared, clock, &single).await?;
    let door_id = door.id();

    // Someone unlocks the door; with a sensor they also walk through and
    // close it behind them.
    host.set_state(&door.lock_entity, "unlocked");
    let trigger = TriggerSource::select(&door.lock_entity, door.sensor_entity.as_deref());
    if let TriggerSource::Sensor(sensor) = &trigger {
        host.set_state(sensor, "on");
        if args.door_open {
            tokio::time::sleep(Duration::from_millis(10)).await;
            host.set_state(sensor, "off");
        }
    }

    tokio::time::sleep(cycle_budget(&door, start)).await;
    let status = autolock.door_status(&door_id)?;
    autolock.shutdown();

    let countdown = host
        .calls_to("timer", "start")
        .first()
        .and_then(|c| c.data.get("duration").cloned());
    let lock_attempts = host.calls_to("lock", "lock").len();
    let locked = status.lock_state.as_deref() == Some("locked");

    Ok(json!({
        "door": door_id,
        "triggered_at": start.to_rfc3339(),
        "trigger": trigger,
        "countdown": countdown,
        "lock_attempts": lock_attempts,
        "lock_state": status.lock_state,
        "locked": locked,
        "calls": host.calls(),
        "notifications": host.notifications(),
    }))
}

/// Upper bound on how long one full cycle can take on the paused clock:
/// the countdown, every attempt's verification window and every backoff
/// pause with jitter headroom.
fn cycle_budget(door: &DoorConfig, start: DateTime<FixedOffset>) -> Duration {
    let policy = door.retry_policy();
    let window = door.window().ok().flatten();
    let minutes = delay_for(&start, &door.delay_policy(), window.as_ref());

    let countdown = Duration::from_secs(u64::from(minutes) * 60);
    let per_attempt = door.verification_delay() + VERIFY_TIMEOUT + Duration::from_secs(1);
    let pauses = policy.max_delay.max(policy.base_delay) * policy.max_retries;
    countdown + per_attempt * policy.max_attempts() + pauses.mul_f64(1.1) + Duration::from_secs(5)
}
