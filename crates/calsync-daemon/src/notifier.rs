//! Notification sink for the daemon
//!
//! There is no UI attached to the daemon, so user-visible notifications
//! end up in the log at a level matching their priority.

use calsync_core::ports::{INotificationService, Notification, NotificationPriority};
use tracing::{info, warn};

/// Writes notifications to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationService;

#[async_trait::async_trait]
impl INotificationService for LogNotificationService {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        match notification.priority {
            NotificationPriority::High => warn!(
                title = %notification.title,
                body = %notification.body,
                "User notification"
            ),
            NotificationPriority::Normal | NotificationPriority::Low => info!(
                title = %notification.title,
                body = %notification.body,
                "User notification"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_never_fails() {
        let service = LogNotificationService;
        assert!(service
            .notify(&Notification::error("Sync Failed", "disk full"))
            .await
            .is_ok());
        assert!(service.notify(&Notification::new("Hello", "")).await.is_ok());
    }
}
