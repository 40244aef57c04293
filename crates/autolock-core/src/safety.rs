//! Pre-lock safety checks and post-lock verification.
//!
//! One call to [`SafetyValidator::lock_with_verification`] is one lock
//! attempt:
//!
//! ```text
//! Idle -> PreCheck -> Commanding -> Verifying -> (Verified | Failed)
//!            |            |
//!            +------------+--> Failed
//! ```
//!
//! Pre-check rejections never issue a command. A command that raises is
//! captured as [`LockError::CommandFailed`]. Verification waits for
//! `verification_delay`, then polls the lock state every 500 ms for up to
//! 5 s more. Every path ends in a [`LockAttemptOutcome`]; nothing here
//! returns an `Err` or panics on host failure.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::constants::{LOCK_STATE_LOCKED, SENSOR_STATE_CLOSED};
use crate::error::LockError;
use crate::host::{entity_data, Host};

/// Interval between lock-state polls during verification.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polling budget after the verification delay has elapsed.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Phases of one lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Idle,
    PreCheck,
    Commanding,
    Verifying,
    Verified,
    Failed,
}

/// Terminal result of one lock attempt.
///
/// Either verified (`success && verified`, no error) or failed (neither,
/// with the reason). No other combination is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockAttemptOutcome {
    pub success: bool,
    pub verified: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<LockError>,
}

impl LockAttemptOutcome {
    pub fn verified() -> Self {
        Self {
            success: true,
            verified: true,
            error: None,
        }
    }

    pub fn failed(error: LockError) -> Self {
        Self {
            success: false,
            verified: false,
            error: Some(error),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.success && self.verified
    }

    pub fn phase(&self) -> AttemptPhase {
        if self.is_verified() {
            AttemptPhase::Verified
        } else {
            AttemptPhase::Failed
        }
    }

    /// Human-readable failure reason, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// `Ok(())` when verified, otherwise the failure reason.
    pub fn into_result(self) -> Result<(), LockError> {
        match self.error {
            None if self.is_verified() => Ok(()),
            Some(err) => Err(err),
            None => Err(LockError::CommandFailed("Lock failed".to_string())),
        }
    }
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<LockError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Runs lock attempts against a host.
#[derive(Clone)]
pub struct SafetyValidator {
    host: Arc<dyn Host>,
    poll_interval: Duration,
    verify_timeout: Duration,
}

impl SafetyValidator {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            poll_interval: POLL_INTERVAL,
            verify_timeout: VERIFY_TIMEOUT,
        }
    }

    /// Override polling cadence and budget.
    pub fn with_timing(mut self, poll_interval: Duration, verify_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.verify_timeout = verify_timeout;
        self
    }

    /// Side-effect-free pre-check.
    ///
    /// # Errors
    ///
    /// - [`LockError::NotFound`] if the lock (or a given sensor) has no state
    /// - [`LockError::AlreadyLocked`] if the lock already reports locked
    /// - [`LockError::DoorOpen`] if a sensor is given and does not read closed
    pub fn can_lock(&self, lock_entity: &str, sensor_entity: Option<&str>) -> Result<(), LockError> {
        let lock_state = self
            .host
            .get_state(lock_entity)
            .ok_or_else(|| LockError::NotFound {
                entity_id: lock_entity.to_string(),
            })?;

        if lock_state.state == LOCK_STATE_LOCKED {
            return Err(LockError::AlreadyLocked);
        }

        if let Some(sensor) = sensor_entity {
            let sensor_state = self
                .host
                .get_state(sensor)
                .ok_or_else(|| LockError::NotFound {
                    entity_id: sensor.to_string(),
                })?;
            if sensor_state.state != SENSOR_STATE_CLOSED {
                return Err(LockError::DoorOpen);
            }
        }

        Ok(())
    }

    /// Poll until `lock_entity` reports `expected` or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`LockError::NotFound`] as soon as the entity disappears;
    /// [`LockError::VerificationTimeout`] with the last seen state otherwise.
    pub async fn verify_lock_state(
        &self,
        lock_entity: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let started = Instant::now();

        loop {
            let state = self
                .host
                .get_state(lock_entity)
                .ok_or_else(|| LockError::NotFound {
                    entity_id: lock_entity.to_string(),
                })?;

            if state.state == expected {
                return Ok(());
            }

            if started.elapsed() >= timeout {
                return Err(LockError::VerificationTimeout {
                    expected: expected.to_string(),
                    current: state.state,
                    timeout,
                });
            }

            trace!(lock = lock_entity, current = %state.state, "waiting for lock state");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One full attempt: pre-check, command, settle, verify.
    pub async fn lock_with_verification(
        &self,
        lock_entity: &str,
        verification_delay: Duration,
        sensor_entity: Option<&str>,
    ) -> LockAttemptOutcome {
        trace!(lock = lock_entity, phase = ?AttemptPhase::PreCheck);
        if let Err(reason) = self.can_lock(lock_entity, sensor_entity) {
            debug!(lock = lock_entity, %reason, "pre-lock safety check rejected");
            return LockAttemptOutcome::failed(reason);
        }

        trace!(lock = lock_entity, phase = ?AttemptPhase::Commanding);
        if let Err(err) = self
            .host
            .call_service("lock", "lock", entity_data(lock_entity))
            .await
        {
            let error = LockError::CommandFailed(err.to_string());
            warn!(lock = lock_entity, %error, "lock command failed");
            return LockAttemptOutcome::failed(error);
        }
        debug!(lock = lock_entity, "lock service called");

        tokio::time::sleep(verification_delay).await;

        trace!(lock = lock_entity, phase = ?AttemptPhase::Verifying);
        match self
            .verify_lock_state(lock_entity, LOCK_STATE_LOCKED, self.verify_timeout)
            .await
        {
            Ok(()) => {
                debug!(lock = lock_entity, "lock verified");
                LockAttemptOutcome::verified()
            }
            Err(error) => {
                warn!(lock = lock_entity, %error, "lock verification failed");
                LockAttemptOutcome::failed(error)
            }
        }
    }
}

impl std::fmt::Debug for SafetyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyValidator")
            .field("poll_interval", &self.poll_interval)
            .field("verify_timeout", &self.verify_timeout)
            .finish()
    }
}
