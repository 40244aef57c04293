pub mod check;
pub mod delay;
pub mod simulate;

use std::path::Path;

use autolock_core::{AppConfig, ConfigError, DoorConfig};

/// Load the config at `path`, or at the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load(&AppConfig::default_path()),
    }
}

/// Look a door up by id.
pub fn find_door<'a>(
    config: &'a AppConfig,
    door_id: &str,
) -> Result<&'a DoorConfig, Box<dyn std::error::Error>> {
    config.door(door_id).ok_or_else(|| {
        let known: Vec<String> = config.doors.iter().map(DoorConfig::id).collect();
        format!("unknown door: {door_id} (known: {})", known.join(", ")).into()
    })
}
