//! Channel-based consumer.
//!
//! Forwards connection manager output over an unbounded channel so another
//! task (a UI loop, a recorder) can pick it up at its own pace.

use tokio::sync::mpsc;
use valvewatch_types::{CanonicalReading, ConnectionState};

use super::Consumer;
use crate::data::AlertEvent;
use crate::events::DebugEvent;

/// One piece of connection manager output.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Batch(Vec<CanonicalReading>),
    Status(ConnectionState),
    Alert(AlertEvent),
    Log(DebugEvent),
}

/// A consumer that sends every update down a channel.
///
/// # Example
///
/// ```
/// use valvewatch::ChannelConsumer;
///
/// let (consumer, mut feed) = ChannelConsumer::create();
/// assert!(feed.poll().is_none());
/// # drop(consumer);
/// ```
#[derive(Debug)]
pub struct ChannelConsumer {
    sender: mpsc::UnboundedSender<Update>,
}

impl ChannelConsumer {
    /// Create a consumer and the feed that receives its updates.
    pub fn create() -> (Self, UpdateFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, UpdateFeed { receiver })
    }

    fn forward(&self, update: Update) {
        // A dropped feed just means nobody is listening any more.
        let _ = self.sender.send(update);
    }
}

impl Consumer for ChannelConsumer {
    fn on_batch(&mut self, readings: &[CanonicalReading]) {
        self.forward(Update::Batch(readings.to_vec()));
    }

    fn on_status_change(&mut self, state: ConnectionState) {
        self.forward(Update::Status(state));
    }

    fn on_alert(&mut self, alert: &AlertEvent) {
        self.forward(Update::Alert(alert.clone()));
    }

    fn on_debug_log(&mut self, event: &DebugEvent) {
        self.forward(Update::Log(event.clone()));
    }
}

/// Receiving end of a [`ChannelConsumer`].
#[derive(Debug)]
pub struct UpdateFeed {
    receiver: mpsc::UnboundedReceiver<Update>,
}

impl UpdateFeed {
    /// Next pending update, without waiting.
    pub fn poll(&mut self) -> Option<Update> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next update. `None` once the consumer is gone.
    pub async fn recv(&mut self) -> Option<Update> {
        self.receiver.recv().await
    }

    /// Every update currently pending.
    pub fn drain(&mut self) -> Vec<Update> {
        std::iter::from_fn(|| self.poll()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_poll() {
        let (mut consumer, mut feed) = ChannelConsumer::create();

        // Nothing sent yet
        assert!(feed.poll().is_none());

        consumer.on_status_change(ConnectionState::Connecting);
        consumer.on_batch(&[CanonicalReading::default()]);

        assert_eq!(feed.poll(), Some(Update::Status(ConnectionState::Connecting)));
        assert!(matches!(feed.poll(), Some(Update::Batch(b)) if b.len() == 1));
        assert!(feed.poll().is_none());
    }

    #[test]
    fn test_send_after_feed_dropped_is_harmless() {
        let (mut consumer, feed) = ChannelConsumer::create();
        drop(feed);
        consumer.on_status_change(ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_recv_ends_when_consumer_dropped() {
        let (mut consumer, mut feed) = ChannelConsumer::create();
        consumer.on_status_change(ConnectionState::Open);
        drop(consumer);

        assert_eq!(feed.recv().await, Some(Update::Status(ConnectionState::Open)));
        assert_eq!(feed.recv().await, None);
    }
}
