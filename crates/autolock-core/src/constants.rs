//! Entity-id templates, defaults and validation ranges.

// Helper entity templates; `{door_id}` is substituted per door.
pub const ENABLED_TEMPLATE: &str = "input_boolean.autolock_{door_id}_enabled";
pub const SNOOZE_TEMPLATE: &str = "input_datetime.autolock_{door_id}_snooze_until";
pub const TIMER_TEMPLATE: &str = "timer.autolock_{door_id}_delay";
pub const FAILURE_NOTIFICATION_TEMPLATE: &str = "autolock_{door_id}_failure";
pub const MANUAL_FAILURE_NOTIFICATION_TEMPLATE: &str = "autolock_{door_id}_manual_failure";

// Defaults
pub const DEFAULT_DAY_DELAY: u32 = 5; // minutes
pub const DEFAULT_NIGHT_DELAY: u32 = 2; // minutes
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY: u64 = 5; // seconds
pub const DEFAULT_VERIFICATION_DELAY: u64 = 5; // seconds
pub const DEFAULT_MAX_RETRY_DELAY: u64 = 60; // seconds
pub const DEFAULT_ENABLE_ON_CREATION: bool = true;

// Validation ranges (inclusive)
pub const DAY_DELAY_RANGE: (u64, u64) = (1, 240);
pub const NIGHT_DELAY_RANGE: (u64, u64) = (1, 30);
pub const RETRY_COUNT_RANGE: (u64, u64) = (0, 5);
pub const RETRY_DELAY_RANGE: (u64, u64) = (3, 60);
pub const VERIFICATION_DELAY_RANGE: (u64, u64) = (2, 10);
pub const MAX_RETRY_DELAY_LIMIT: u64 = 600; // seconds

// Lock states
pub const LOCK_STATE_LOCKED: &str = "locked";
pub const LOCK_STATE_UNLOCKED: &str = "unlocked";

/// Binary sensor state for a closed door.
pub const SENSOR_STATE_CLOSED: &str = "on";

/// Helper boolean state meaning "enabled".
pub const ENABLED_STATE_ON: &str = "on";

/// Timer entity state while a countdown runs.
pub const TIMER_STATE_ACTIVE: &str = "active";

/// Allowed snooze durations in minutes.
pub const SNOOZE_DURATIONS: [u32; 3] = [15, 30, 60];

/// Fill `{door_id}` in one of the templates above.
pub fn door_template(template: &str, door_id: &str) -> String {
    template.replace("{door_id}", door_id)
}
