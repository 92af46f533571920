use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::notifications::Notifier;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Fire-and-forget publish used after a transaction has committed.
    /// A full or closed channel is logged and otherwise ignored.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "Dropping event after commit");
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Creates a bounded event channel
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Events emitted once the owning transaction has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StockAdjusted {
        entry_id: i64,
        item_id: i64,
        site_id: Option<i64>,
        kind: String,
        previous_balance: i64,
        resulting_balance: i64,
    },
    LowStock {
        item_id: i64,
        balance: i64,
        threshold: i64,
    },
    LedgerEntryVoided {
        entry_id: i64,
        item_id: i64,
    },

    OrderCreated(Uuid),
    OrderDeleted(Uuid),
    ChannelTransitioned {
        order_id: Uuid,
        channel: String,
        from: String,
        to: String,
        overall_status: String,
        actor: Option<String>,
        note: Option<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::LowStock { .. } => "low_stock",
            Event::LedgerEntryVoided { .. } => "ledger_entry_voided",
            Event::OrderCreated(_) => "order_created",
            Event::OrderDeleted(_) => "order_deleted",
            Event::ChannelTransitioned { .. } => "channel_transitioned",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Option<Arc<dyn Notifier>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(event = event.name(), "Received event: {:?}", event);

        if let Event::LowStock {
            item_id,
            balance,
            threshold,
        } = &event
        {
            warn!(item_id, balance, threshold, "Item at or below low-stock threshold");
        }

        if let Some(notifier) = &notifier {
            if let Err(e) = notifier.notify(&event).await {
                error!(event = event.name(), error = %e, "Notification delivery failed");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationError, Notifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &Event) -> Result<(), NotificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NotificationError::Delivery("smtp down".into()))
        }
    }

    #[tokio::test]
    async fn notifier_failures_do_not_stop_the_loop() {
        let (sender, rx) = channel(8);
        let notifier = Arc::new(FailingNotifier {
            calls: AtomicUsize::new(0),
        });

        sender.publish(Event::OrderCreated(Uuid::new_v4()));
        sender.publish(Event::LowStock {
            item_id: 1,
            balance: 2,
            threshold: 5,
        });
        drop(sender);

        process_events(rx, Some(notifier.clone())).await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn publish_on_full_channel_drops_silently() {
        let (sender, mut rx) = channel(1);
        sender.publish(Event::OrderDeleted(Uuid::nil()));
        sender.publish(Event::OrderDeleted(Uuid::nil()));

        assert!(rx.recv().await.is_some());
        drop(sender);
        assert!(rx.recv().await.is_none());
    }
}
