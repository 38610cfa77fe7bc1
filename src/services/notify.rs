//! Outbound notification port. Delivery transport (SMS/email) is a
//! collaborator outside the core; dispatch is fire-and-forget and a failed
//! send never rolls back a workflow transition.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient_member_id: Uuid,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Default sender: logs the notification instead of delivering it.
pub struct TracingNotifier;

#[async_trait]
impl NotificationSender for TracingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %notification.recipient_member_id,
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Dispatch without letting a transport failure surface to the caller.
pub(crate) async fn send_best_effort(sender: &dyn NotificationSender, notification: Notification) {
    let recipient = notification.recipient_member_id;
    if let Err(e) = sender.send(notification).await {
        tracing::warn!(%recipient, "notification dispatch failed: {e}");
    }
}
