//! Notification service port (driven/secondary port)
//!
//! User-visible signals raised by the sync layer: a permission that needs
//! granting, a missing or read-only calendar, or a sync that failed after
//! all retries. On a phone this maps to an alert dialog; the daemon logs
//! them.
//!
//! ## Design Notes
//!
//! - Notifications are fire-and-forget; delivery failures are logged by the
//!   caller and never abort a sync.

use serde::{Deserialize, Serialize};

/// Priority level for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Informational, may be shown passively
    Low,
    /// Normal priority
    Normal,
    /// Requires the user's attention
    High,
}

impl Default for NotificationPriority {
    fn default() -> Self {
        NotificationPriority::Normal
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// A notification to display to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short title
    pub title: String,
    /// Body text with details
    pub body: String,
    /// Priority level
    pub priority: NotificationPriority,
}

impl Notification {
    /// Creates a notification with `Normal` priority
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            priority: NotificationPriority::Normal,
        }
    }

    /// Sets the priority level
    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Creates an error notification with High priority
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body).with_priority(NotificationPriority::High)
    }
}

/// Port trait for user-visible notifications
#[async_trait::async_trait]
pub trait INotificationService: Send + Sync {
    /// Delivers a notification to the user
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
