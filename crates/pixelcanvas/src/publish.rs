//! # Change Publisher
//!
//! Serializes a [`ChunkUpdateEvent`] and publishes it to the chunk update
//! topic, waiting for the broker to acknowledge it.

use crate::{ChunkUpdateEvent, MessageBroker, MessageId, Result};
use std::sync::Arc;

/// Publishes chunk updates to one topic.
#[derive(Clone)]
pub struct ChangePublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
}

impl ChangePublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes `event` as compact JSON and returns the broker's message id.
    ///
    /// # Errors
    ///
    /// Broker failures are returned unchanged; nothing is retried here.
    pub async fn publish(&self, event: &ChunkUpdateEvent) -> Result<MessageId> {
        let data = event.to_bytes()?;
        let id = self.broker.publish(&self.topic, data).await?;
        tracing::info!(
            topic = %self.topic,
            message_id = %id,
            chunk_x = event.chunk_x,
            chunk_y = event.chunk_y,
            pixels = event.pixels.len(),
            "Published chunk update"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ManualClock, MemoryBroker, PixelUpdate};
    use chrono::DateTime;

    fn event() -> ChunkUpdateEvent {
        ChunkUpdateEvent {
            size: 100,
            pixels: [("50_12".to_string(), PixelUpdate { color: 3, user: 42 })].into(),
            chunk_x: 1,
            chunk_y: 0,
            last_updated: None,
        }
    }

    fn broker() -> Arc<MemoryBroker> {
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        Arc::new(MemoryBroker::new(Arc::new(clock)))
    }

    #[tokio::test]
    async fn publishes_compact_json() {
        let broker = broker();
        broker.create_topic("pixel.update");
        broker.subscribe("pixel.update", "viewer").unwrap();

        let publisher = ChangePublisher::new(broker.clone(), "pixel.update");
        let id = publisher.publish(&event()).await.unwrap();

        let messages = broker.pull("viewer", 1).unwrap();
        assert_eq!(messages[0].id, id);
        assert_eq!(
            std::str::from_utf8(&messages[0].data).unwrap(),
            r#"{"size":100,"pixels":{"50_12":{"color":3,"user":42}},"chunkX":1,"chunkY":0}"#
        );
    }

    #[tokio::test]
    async fn broker_failure_is_returned() {
        let publisher = ChangePublisher::new(broker(), "missing");
        let err = publisher.publish(&event()).await.unwrap_err();
        assert!(matches!(err, Error::Broker { .. }));
    }
}
