//! # Reset Coordinator
//!
//! Seeks every subscription of a topic to the current time so that new
//! consumers do not replay the backlog. Subscriptions are sought one at a
//! time in listing order; the first failure stops the reset, leaving earlier
//! subscriptions sought and later ones untouched.

use crate::{Error, MessageBroker, Result, TimeSource, store::rfc3339};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// What a successful reset did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub topic: String,
    /// Subscriptions sought, in order.
    pub subscriptions: Vec<String>,
    /// The time every subscription was sought to.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub at: DateTime<Utc>,
}

fn serialize_rfc3339<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&rfc3339(at))
}

#[derive(Clone)]
pub struct ResetCoordinator {
    broker: Arc<dyn MessageBroker>,
    clock: Arc<dyn TimeSource>,
}

impl ResetCoordinator {
    pub fn new(broker: Arc<dyn MessageBroker>, clock: Arc<dyn TimeSource>) -> Self {
        Self { broker, clock }
    }

    /// Seeks every subscription of `topic` to now.
    ///
    /// # Errors
    ///
    /// - [`Error::Broker`] if the subscriptions cannot be listed.
    /// - [`Error::Seek`] naming the first subscription that failed.
    pub async fn reset(&self, topic: &str) -> Result<ResetReport> {
        let at = self.clock.now();
        let subscriptions = self.broker.list_subscriptions(topic).await?;
        tracing::info!(topic, count = subscriptions.len(), "Resetting subscriptions");

        for subscription in &subscriptions {
            if let Err(e) = self.broker.seek(subscription, at).await {
                tracing::error!(topic, subscription = %subscription, "Seek failed: {e}");
                return Err(Error::Seek {
                    subscription: subscription.clone(),
                    reason: e.to_string(),
                });
            }
            tracing::info!(subscription = %subscription, at = %rfc3339(&at), "Sought subscription");
        }

        Ok(ResetReport {
            topic: topic.to_string(),
            subscriptions,
            at,
        })
    }
}
