use std::path::PathBuf;

use autolock_core::{BackoffMode, DoorConfig, TriggerSource};
use clap::Args;
use serde_json::json;

use super::load_config;

#[derive(Args)]
pub struct CheckArgs {
    /// Config file (defaults to $AUTOLOCK_CONFIG or ~/.config/autolock/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: CheckArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;

    if args.json {
        let doors: Vec<serde_json::Value> = config.doors.iter().map(door_summary).collect();
        println!("{}", serde_json::to_string_pretty(&doors)?);
        return Ok(());
    }

    if config.doors.is_empty() {
        println!("config ok, no doors configured");
        return Ok(());
    }

    println!("config ok, {} door(s)", config.doors.len());
    for door in &config.doors {
        let trigger = match TriggerSource::select(&door.lock_entity, door.sensor_entity.as_deref()) {
            TriggerSource::Sensor(id) => format!("sensor {id} closes"),
            TriggerSource::Lock(id) => format!("lock {id} unlocks"),
        };
        let night = match (&door.night_start, &door.night_end) {
            (Some(start), Some(end)) => format!("{}m ({start}-{end})", door.night_delay),
            _ => "none".to_string(),
        };
        println!("  {} \"{}\"", door.id(), door.name);
        println!("    lock:     {}", door.lock_entity);
        println!("    trigger:  {trigger}");
        println!("    delay:    day {}m, night {night}", door.day_delay);
        println!(
            "    retries:  {} every {}s ({}), verify after {}s",
            door.retry_count,
            door.retry_delay,
            backoff_label(door.backoff),
            door.verification_delay
        );
    }
    Ok(())
}

fn door_summary(door: &DoorConfig) -> serde_json::Value {
    json!({
        "id": door.id(),
        "name": door.name,
        "lock_entity": door.lock_entity,
        "sensor_entity": door.sensor_entity,
        "trigger": TriggerSource::select(&door.lock_entity, door.sensor_entity.as_deref()),
        "day_delay": door.day_delay,
        "night_delay": door.night_delay,
        "night_start": door.night_start,
        "night_end": door.night_end,
        "retry_count": door.retry_count,
        "retry_delay": door.retry_delay,
        "verification_delay": door.verification_delay,
        "backoff": door.backoff,
        "enable_on_creation": door.enable_on_creation,
    })
}

fn backoff_label(mode: BackoffMode) -> &'static str {
    match mode {
        BackoffMode::Fixed => "fixed",
        BackoffMode::Exponential => "exponential",
    }
}
