//! TOML door configuration.
//!
//! ```toml
//! [[doors]]
//! name = "Front Door"
//! lock_entity = "lock.front_door"
//! sensor_entity = "binary_sensor.front_door"
//! day_delay = 5
//! night_delay = 2
//! night_start = "22:00"
//! night_end = "06:00"
//!
//! [notifications]
//! push_target = "mobile_app_phone"
//! ```
//!
//! The file lives at `~/.config/autolock/config.toml` unless
//! `AUTOLOCK_CONFIG` points elsewhere. Everything is validated once at load
//! time; a door that loads is a door whose values are all in range.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DAY_DELAY_RANGE, DEFAULT_DAY_DELAY, DEFAULT_ENABLE_ON_CREATION, DEFAULT_MAX_RETRY_DELAY,
    DEFAULT_NIGHT_DELAY, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY, DEFAULT_VERIFICATION_DELAY,
    MAX_RETRY_DELAY_LIMIT, NIGHT_DELAY_RANGE, RETRY_COUNT_RANGE, RETRY_DELAY_RANGE,
    VERIFICATION_DELAY_RANGE,
};
use crate::error::ConfigError;
use crate::host::{entity_domain, is_valid_entity_id};
use crate::retry::RetryPolicy;
use crate::schedule::{DelayPolicy, ScheduleWindow};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "AUTOLOCK_CONFIG";

/// Spacing between lock attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    #[default]
    Fixed,
    Exponential,
}

/// One door.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorConfig {
    /// Stable identifier used in helper entity ids. Derived from `name`
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lock_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_entity: Option<String>,
    /// Minutes.
    #[serde(default = "default_day_delay")]
    pub day_delay: u32,
    /// Minutes.
    #[serde(default = "default_night_delay")]
    pub night_delay: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_end: Option<String>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Seconds.
    #[serde(default = "default_verification_delay")]
    pub verification_delay: u64,
    #[serde(default = "default_enable_on_creation")]
    pub enable_on_creation: bool,
    #[serde(default)]
    pub backoff: BackoffMode,
    #[serde(default)]
    pub jitter: bool,
    /// Seconds; caps exponential backoff.
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,
}

/// Notification channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// `notify.<push_target>`; first available notify service when absent.
    #[serde(default)]
    pub push_target: Option<String>,
    #[serde(default = "default_true")]
    pub persistent: bool,
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub doors: Vec<DoorConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_day_delay() -> u32 {
    DEFAULT_DAY_DELAY
}
fn default_night_delay() -> u32 {
    DEFAULT_NIGHT_DELAY
}
fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY
}
fn default_verification_delay() -> u64 {
    DEFAULT_VERIFICATION_DELAY
}
fn default_enable_on_creation() -> bool {
    DEFAULT_ENABLE_ON_CREATION
}
fn default_max_retry_delay() -> u64 {
    DEFAULT_MAX_RETRY_DELAY
}
fn default_true() -> bool {
    true
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            push_target: None,
            persistent: true,
        }
    }
}

impl DoorConfig {
    /// A door with every optional value at its default.
    pub fn new(name: &str, lock_entity: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            lock_entity: lock_entity.to_string(),
            sensor_entity: None,
            day_delay: DEFAULT_DAY_DELAY,
            night_delay: DEFAULT_NIGHT_DELAY,
            night_start: None,
            night_end: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
            verification_delay: DEFAULT_VERIFICATION_DELAY,
            enable_on_creation: DEFAULT_ENABLE_ON_CREATION,
            backoff: BackoffMode::Fixed,
            jitter: false,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }

    /// Explicit id, or the slugified name.
    pub fn id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => slugify(&self.name),
        }
    }

    /// Night window, if both ends are set.
    ///
    /// # Errors
    ///
    /// [`ConfigError::IncompleteWindow`] when only one end is set, or
    /// [`ConfigError::InvalidTimeFormat`] for a malformed time.
    pub fn window(&self) -> Result<Option<ScheduleWindow>, ConfigError> {
        match (&self.night_start, &self.night_end) {
            (Some(start), Some(end)) => ScheduleWindow::from_strings(start, end).map(Some),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteWindow { door: self.id() }),
        }
    }

    pub fn delay_policy(&self) -> DelayPolicy {
        DelayPolicy::new(self.day_delay, self.night_delay)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_secs(self.retry_delay);
        match self.backoff {
            BackoffMode::Fixed => RetryPolicy {
                jitter: self.jitter,
                ..RetryPolicy::fixed(self.retry_count, base)
            },
            BackoffMode::Exponential => RetryPolicy {
                max_retries: self.retry_count,
                base_delay: base,
                exponential: true,
                max_delay: Duration::from_secs(self.max_retry_delay.max(self.retry_delay)),
                jitter: self.jitter,
            },
        }
    }

    pub fn verification_delay(&self) -> Duration {
        Duration::from_secs(self.verification_delay)
    }

    /// Check every field of this door.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id();
        if self.name.trim().is_empty() && self.id.is_none() {
            return Err(ConfigError::MissingKey("name".into()));
        }
        if id.is_empty() {
            return Err(ConfigError::MissingKey(format!("{}.id", self.name)));
        }
        if self.id.is_some() && !is_valid_door_id(&id) {
            return Err(ConfigError::InvalidId(id));
        }
        if self.lock_entity.is_empty() {
            return Err(ConfigError::MissingKey(format!("{id}.lock_entity")));
        }

        check_entity(&format!("{id}.lock_entity"), &self.lock_entity, "lock")?;
        if let Some(sensor) = &self.sensor_entity {
            check_entity(&format!("{id}.sensor_entity"), sensor, "binary_sensor")?;
        }

        check_range(&format!("{id}.day_delay"), self.day_delay.into(), DAY_DELAY_RANGE)?;
        check_range(&format!("{id}.night_delay"), self.night_delay.into(), NIGHT_DELAY_RANGE)?;
        check_range(&format!("{id}.retry_count"), self.retry_count.into(), RETRY_COUNT_RANGE)?;
        check_range(&format!("{id}.retry_delay"), self.retry_delay, RETRY_DELAY_RANGE)?;
        check_range(
            &format!("{id}.verification_delay"),
            self.verification_delay,
            VERIFICATION_DELAY_RANGE,
        )?;
        check_range(
            &format!("{id}.max_retry_delay"),
            self.max_retry_delay,
            (self.retry_delay, MAX_RETRY_DELAY_LIMIT),
        )?;

        self.window()?;
        Ok(())
    }
}

impl AppConfig {
    /// Config file location: `$AUTOLOCK_CONFIG` or
    /// `~/.config/autolock/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("autolock")
            .join("config.toml")
    }

    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::LoadFailed`] if the file cannot be read, otherwise
    /// whatever [`AppConfig::load_str`] reports.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::load_str(&content)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ParseFailed`] for malformed TOML, or the first
    /// validation error.
    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every door and check that ids are unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for door in &self.doors {
            door.validate()?;
            let id = door.id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateDoor(id));
            }
        }
        Ok(())
    }

    pub fn door(&self, id: &str) -> Option<&DoorConfig> {
        self.doors.iter().find(|d| d.id() == id)
    }
}

/// `"Front Door #2"` -> `"front_door_2"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn check_range(key: &str, value: u64, (min, max): (u64, u64)) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            min,
            max,
        })
    }
}

fn is_valid_door_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn check_entity(key: &str, entity_id: &str, expected_domain: &str) -> Result<(), ConfigError> {
    if is_valid_entity_id(entity_id) && entity_domain(entity_id) == Some(expected_domain) {
        Ok(())
    } else {
        Err(ConfigError::InvalidEntity {
            key: key.to_string(),
            entity_id: entity_id.to_string(),
            expected_domain: expected_domain.to_string(),
        })
    }
}
