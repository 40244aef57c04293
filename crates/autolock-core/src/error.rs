//! Core error types for autolock-core.
//!
//! This module defines the error hierarchy using thiserror. Lock attempt
//! failures ([`LockError`]) are carried inside a
//! [`LockAttemptOutcome`](crate::safety::LockAttemptOutcome) rather than
//! raised, so the retry loop can inspect them without unwinding.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Core error type for autolock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Host collaborator errors
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Service-call errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
///
/// All of these are fatal at setup time. Nothing in the configuration is
/// silently replaced by a default once the user has supplied a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Malformed time-of-day string
    #[error("Invalid time format: {value}. Expected HH:MM")]
    InvalidTimeFormat { value: String },

    /// Only one end of the night window was given
    #[error("Night window for door '{door}' needs both night_start and night_end")]
    IncompleteWindow { door: String },

    /// Numeric value outside its allowed range
    #[error("Invalid value for '{key}': {value} (allowed {min}..={max})")]
    OutOfRange {
        key: String,
        value: u64,
        min: u64,
        max: u64,
    },

    /// Entity id is malformed or belongs to the wrong domain
    #[error("Invalid entity for '{key}': {entity_id} (expected domain '{expected_domain}')")]
    InvalidEntity {
        key: String,
        entity_id: String,
        expected_domain: String,
    },

    /// Door id unusable inside helper entity ids
    #[error("Invalid door id: '{0}'. Use lowercase letters, digits and underscores")]
    InvalidId(String),

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Two doors resolved to the same id
    #[error("Duplicate door id: {0}")]
    DuplicateDoor(String),
}

/// Why a single lock attempt did not end in a verified lock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// A referenced entity has no readable state
    #[error("Entity {entity_id} not found")]
    NotFound { entity_id: String },

    /// The lock already reports the locked state
    #[error("Lock is already locked")]
    AlreadyLocked,

    /// The door sensor does not report closed
    #[error("Door is open")]
    DoorOpen,

    /// The host raised while issuing the lock command
    #[error("Lock service call failed: {0}")]
    CommandFailed(String),

    /// The lock never reported the expected state within the budget
    #[error(
        "Lock verification failed: lock did not reach state {expected} within {timeout:?} (current: {current})"
    )]
    VerificationTimeout {
        expected: String,
        current: String,
        timeout: Duration,
    },
}

impl LockError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// A missing entity will not reappear between attempts and an already
    /// locked door needs no further work. An open door may still close, so
    /// it is retried along with command and verification failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            LockError::NotFound { .. } | LockError::AlreadyLocked => false,
            LockError::DoorOpen
            | LockError::CommandFailed(_)
            | LockError::VerificationTimeout { .. } => true,
        }
    }

    /// Pre-check rejections happen before any command is issued.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LockError::NotFound { .. } | LockError::AlreadyLocked | LockError::DoorOpen
        )
    }
}

/// Errors raised by a host implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The service exists but the call failed
    #[error("Service {domain}.{service} failed: {message}")]
    ServiceFailed {
        domain: String,
        service: String,
        message: String,
    },

    /// No such service registered on the host
    #[error("Unknown service {domain}.{service}")]
    UnknownService { domain: String, service: String },

    /// Service data was missing a field or had the wrong shape
    #[error("Invalid data for {domain}.{service}: {message}")]
    InvalidData {
        domain: String,
        service: String,
        message: String,
    },
}

/// Errors returned to callers of the outward-facing service commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No door registered under this id
    #[error("Door {0} not found")]
    DoorNotFound(String),

    /// A door with this id is already registered
    #[error("Door {0} is already registered")]
    DuplicateDoor(String),

    /// Snooze only accepts a fixed set of durations
    #[error("Invalid snooze duration: {0} (must be 15, 30, or 60)")]
    InvalidSnoozeDuration(u32),

    /// The host rejected a command issued on behalf of the service
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(!LockError::NotFound { entity_id: "lock.x".into() }.is_retryable());
        assert!(!LockError::AlreadyLocked.is_retryable());
        assert!(LockError::DoorOpen.is_retryable());
        assert!(LockError::CommandFailed("boom".into()).is_retryable());
        assert!(LockError::VerificationTimeout {
            expected: "locked".into(),
            current: "unlocked".into(),
            timeout: Duration::from_secs(5),
        }
        .is_retryable());
    }

    #[test]
    fn test_precondition_classification() {
        assert!(LockError::DoorOpen.is_precondition());
        assert!(LockError::AlreadyLocked.is_precondition());
        assert!(!LockError::CommandFailed("x".into()).is_precondition());
    }

    #[test]
    fn test_timeout_message_mentions_timeout() {
        let err = LockError::VerificationTimeout {
            expected: "locked".into(),
            current: "unlocked".into(),
            timeout: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("within 5s"));
        assert!(msg.contains("current: unlocked"));
    }

    #[test]
    fn test_config_error_converts_into_core_error() {
        let err: CoreError = ConfigError::InvalidTimeFormat { value: "25:00".into() }.into();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("Expected HH:MM"));
    }
}
