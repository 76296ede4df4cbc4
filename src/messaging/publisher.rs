use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event_sourcing::store::OutboxMessage;

// ============================================================================
// Event Publisher - target of the outbox relay
// ============================================================================

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: PublishedMessage) -> Result<()>;
}

/// A message as handed to downstream consumers.
/// `event_id` is stable across redeliveries so consumers can deduplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub topic: String,
    pub key: String,
    pub payload: String,
}

impl From<&OutboxMessage> for PublishedMessage {
    fn from(msg: &OutboxMessage) -> Self {
        Self {
            event_id: msg.event_id,
            aggregate_id: msg.aggregate_id,
            topic: msg.topic.clone(),
            key: msg.partition_key.clone(),
            payload: msg.payload.clone(),
        }
    }
}

/// In-process publisher backed by a bounded tokio channel
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<PublishedMessage>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishedMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, message: PublishedMessage) -> Result<()> {
        let (topic, key, event_id) = (message.topic.clone(), message.key.clone(), message.event_id);

        self.sender
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("Subscriber for topic {} is gone", topic))?;

        tracing::debug!(topic = %topic, key = %key, event_id = %event_id, "Published message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &str) -> PublishedMessage {
        PublishedMessage {
            event_id: Uuid::new_v4(),
            aggregate_id: Uuid::nil(),
            topic: "order-events".to_string(),
            key: "a".to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers_in_order() {
        let (publisher, mut receiver) = ChannelPublisher::new(4);
        let first = message("{\"n\":1}");

        publisher.publish(first.clone()).await.unwrap();
        publisher.publish(message("{\"n\":2}")).await.unwrap();

        assert_eq!(receiver.recv().await.unwrap(), first);
        assert_eq!(receiver.recv().await.unwrap().payload, "{\"n\":2}");
    }

    #[tokio::test]
    async fn test_publish_fails_when_receiver_dropped() {
        let (publisher, receiver) = ChannelPublisher::new(1);
        drop(receiver);

        assert!(publisher.publish(message("{}")).await.is_err());
    }
}
