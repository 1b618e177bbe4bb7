use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Broker-assigned identifier of a published message.
pub type MessageId = String;

/// The broker operations the pipeline depends on.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes `data` to `topic` and waits for the broker's acknowledgment.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<MessageId>;

    /// Lists the names of every subscription bound to `topic`.
    async fn list_subscriptions(&self, topic: &str) -> Result<Vec<String>>;

    /// Marks every message published to `subscription` before `to` as
    /// acknowledged.
    async fn seek(&self, subscription: &str, to: DateTime<Utc>) -> Result<()>;
}
