use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An outbound notification handed to the dispatcher after a settlement
/// commits. Delivery is best effort and never feeds back into the
/// settlement transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default dispatcher: writes the notification to the log. Real
/// deployments plug in a push/email transport behind the same trait.
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            recipient = %notification.recipient,
            title = %notification.title,
            "notification dispatched: {}",
            notification.message
        );
        Ok(())
    }
}
