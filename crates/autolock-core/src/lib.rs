//! # Autolock Core Library
//!
//! This library provides the decision and verification logic for automatic
//! door locking. It runs against a home-automation host that owns entity
//! state, service calls and the event bus; the host is reached only through
//! the [`Host`] trait, so the same core drives a real integration, the
//! in-memory test host and the CLI simulation.
//!
//! ## Architecture
//!
//! - **Schedule**: pure day/night delay selection with midnight-wrapping
//!   windows
//! - **Retry**: generic bounded retry with fixed or exponential backoff and
//!   jitter
//! - **Safety**: pre-lock checks, the lock command and polled verification
//! - **Door**: per-door orchestration of triggers, countdowns and lock
//!   attempts
//! - **Service**: the door registry and outward commands (lock now, snooze,
//!   enable, disable)
//!
//! ## Key Components
//!
//! - [`Autolock`]: Composition root owning every door
//! - [`Door`]: One door's trigger and lock handling
//! - [`SafetyValidator`]: Lock attempt state machine
//! - [`AppConfig`]: TOML configuration
//! - [`MemoryHost`]: In-memory [`Host`] implementation

pub mod clock;
pub mod config;
pub mod constants;
pub mod door;
pub mod error;
pub mod events;
pub mod host;
pub mod notifications;
pub mod retry;
pub mod safety;
pub mod schedule;
pub mod service;
pub mod trigger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, BackoffMode, DoorConfig, NotificationsConfig};
pub use door::{Door, DoorEntities, DoorStatus, TriggerDecision};
pub use error::{ConfigError, CoreError, HostError, LockError, ServiceError};
pub use events::{EntityState, EventType, HostEvent};
pub use host::{Host, LockBehavior, MemoryHost, ServiceCallRecord, Subscription};
pub use notifications::{NotificationService, Severity};
pub use retry::{execute_with_retry, execute_with_retry_if, RetryOutcome, RetryPolicy};
pub use safety::{AttemptPhase, LockAttemptOutcome, SafetyValidator};
pub use schedule::{delay_for, is_night_time, parse_time_string, DelayPolicy, ScheduleWindow};
pub use service::{Autolock, DoorRegistry, ServiceCall, ServiceResponse, SnoozeDuration};
pub use trigger::TriggerSource;
