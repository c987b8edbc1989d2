use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use transita_core::{Notification, NotificationDispatcher};

/// Drains the settlement outbox and hands each notification to the
/// dispatcher. Runs for the lifetime of the process; a dispatch failure
/// is logged and the loop moves on.
pub async fn run_notification_worker(
    mut rx: mpsc::Receiver<Notification>,
    dispatcher: Arc<dyn NotificationDispatcher>,
) {
    info!("Notification worker started");

    while let Some(notification) = rx.recv().await {
        if let Err(e) = dispatcher.dispatch(&notification).await {
            error!(
                recipient = %notification.recipient,
                "notification dispatch failed: {}",
                e
            );
        }
    }

    info!("Notification worker stopped, outbox closed");
}
