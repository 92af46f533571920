use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::events::Event;

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outbound notification dispatcher. Called after commit only.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Event) -> Result<(), NotificationError>;
}

/// Writes every event to the log as JSON.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Event) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(event)?;
        info!(target: "sitestock_api::notifications", event = event.name(), %payload, "notification");
        Ok(())
    }
}
