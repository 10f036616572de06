use tokio::sync::broadcast;
use tracing::debug;

use common::Notification;

/// Fan-out of push updates. Publishing never blocks: the channel holds a
/// fixed number of events and a receiver that falls behind loses the oldest
/// ones, seeing `RecvError::Lagged(n)` on its next `recv`.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many receivers the event was queued for.
    pub fn publish(&self, notification: Notification) -> usize {
        let event = notification.event_name();
        match self.tx.send(notification) {
            Ok(n) => n,
            Err(_) => {
                debug!(event, "No notification subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}
