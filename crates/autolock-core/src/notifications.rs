//! Failure notifications via the host.
//!
//! Sending is best-effort. A notification that cannot be delivered costs the
//! user one message; it must never take down the door that raised it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::constants::{
    door_template, FAILURE_NOTIFICATION_TEMPLATE, MANUAL_FAILURE_NOTIFICATION_TEMPLATE,
};
use crate::host::Host;

/// How loudly a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

impl Severity {
    /// Push priority hint forwarded to mobile notify services.
    fn push_priority(self) -> &'static str {
        match self {
            Severity::Info => "normal",
            Severity::Warning | Severity::Error => "high",
        }
    }
}

/// Delivers notifications through `persistent_notification` and an
/// optional `notify.*` push service.
#[derive(Clone)]
pub struct NotificationService {
    host: Arc<dyn Host>,
    push_target: Option<String>,
    persistent: bool,
}

impl NotificationService {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            push_target: None,
            persistent: true,
        }
    }

    pub fn with_push_target(mut self, target: Option<String>) -> Self {
        self.push_target = target;
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Send one notification. Returns `true` if at least one channel
    /// accepted it. Never fails.
    pub async fn send_notification(
        &self,
        title: &str,
        message: &str,
        notification_id: Option<&str>,
        severity: Severity,
    ) -> bool {
        let mut delivered = false;

        if self.persistent {
            let mut data = json!({ "title": title, "message": message });
            if let Some(id) = notification_id {
                data["notification_id"] = json!(id);
            }
            match self
                .host
                .call_service("persistent_notification", "create", data)
                .await
            {
                Ok(()) => delivered = true,
                Err(e) => warn!(title, error = %e, "failed to create persistent notification"),
            }
        }

        if let Some(target) = self.resolve_push_target() {
            let data = json!({
                "title": title,
                "message": message,
                "data": { "priority": severity.push_priority(), "tag": notification_id },
            });
            match self.host.call_service("notify", &target, data).await {
                Ok(()) => delivered = true,
                Err(e) => warn!(title, target = %target, error = %e, "failed to send push notification"),
            }
        }

        debug!(title, ?severity, delivered, "notification dispatched");
        delivered
    }

    /// Report that automatic locking gave up.
    pub async fn notify_autolock_failure(
        &self,
        door_id: &str,
        door_name: &str,
        lock_entity: &str,
        error: &str,
    ) -> bool {
        let id = door_template(FAILURE_NOTIFICATION_TEMPLATE, door_id);
        self.send_notification(
            &format!("AutoLock Failed: {door_name}"),
            &failure_message(lock_entity, error),
            Some(&id),
            Severity::Error,
        )
        .await
    }

    /// Report that a user-requested lock failed.
    pub async fn notify_manual_failure(
        &self,
        door_id: &str,
        door_name: &str,
        lock_entity: &str,
        error: &str,
    ) -> bool {
        let id = door_template(MANUAL_FAILURE_NOTIFICATION_TEMPLATE, door_id);
        self.send_notification(
            &format!("Manual Lock Failed: {door_name}"),
            &format!("Failed to lock {lock_entity}: {error}"),
            Some(&id),
            Severity::Error,
        )
        .await
    }

    /// Explicit target, otherwise the first notify service the host offers.
    fn resolve_push_target(&self) -> Option<String> {
        if let Some(target) = &self.push_target {
            return Some(target.clone());
        }
        self.host.notify_services().into_iter().next()
    }
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("push_target", &self.push_target)
            .field("persistent", &self.persistent)
            .finish()
    }
}

fn failure_message(lock_entity: &str, error: &str) -> String {
    format!(
        "Failed to lock {lock_entity}: {error}\n\n\
         Likely cloud auth / integration issue. Check lock integration status."
    )
}
