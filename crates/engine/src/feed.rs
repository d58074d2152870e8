//! Realtime fan-out of appended thread messages.

use domain::Message;
use tokio::sync::broadcast;

/// Broadcast channel carrying every message appended to any thread.
///
/// Publishing happens only after the message's unit of work has
/// committed, so subscribers never observe a rolled-back message.
/// Delivery is at-least-once across reconnects; consumers de-duplicate
/// by [`Message`] id.
#[derive(Clone)]
pub struct MessageFeed {
    sender: broadcast::Sender<Message>,
}

impl MessageFeed {
    /// Creates a feed with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to all messages published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    /// Publishes a committed message.
    pub fn publish(&self, message: &Message) {
        // Send only fails when nobody is subscribed.
        let _ = self.sender.send(message.clone());
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ShopkeeperId, ThreadId, VendorId};
    use domain::Party;

    fn sample_message() -> Message {
        Message::text(
            ThreadId::new(),
            Party::Shopkeeper(ShopkeeperId::new()),
            "any stock left?",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let feed = MessageFeed::new(8);
        let mut rx = feed.subscribe();

        let message = sample_message();
        feed.publish(&message);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, message.id);
        assert_eq!(received.body, message.body);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let feed = MessageFeed::new(8);
        assert_eq!(feed.subscriber_count(), 0);
        feed.publish(&sample_message());
    }

    #[tokio::test]
    async fn each_subscriber_gets_every_message() {
        let feed = MessageFeed::new(8);
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        let vendor = VendorId::new();
        let thread_id = ThreadId::new();
        let first = Message::text(thread_id, Party::Vendor(vendor), "first").unwrap();
        let second = Message::text(thread_id, Party::Vendor(vendor), "second").unwrap();
        feed.publish(&first);
        feed.publish(&second);

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(rx.recv().await.unwrap().id, first.id);
            assert_eq!(rx.recv().await.unwrap().id, second.id);
        }
    }
}
