use super::{MessageBroker, MessageId};
use crate::{Error, Result, TimeSource};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// A message retained by a subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub data: Bytes,
    pub publish_time: DateTime<Utc>,
}

struct Subscription {
    topic: String,
    backlog: VecDeque<Message>,
    ready: Arc<Notify>,
}

#[derive(Default)]
struct State {
    /// Topic name to subscription names, in creation order.
    topics: BTreeMap<String, Vec<String>>,
    subscriptions: BTreeMap<String, Subscription>,
}

/// A [`MessageBroker`] backed by process memory.
///
/// Each subscription keeps its own backlog. A message is fanned out to every
/// subscription that exists when it is published, and is acknowledged as soon
/// as it is pulled.
pub struct MemoryBroker {
    clock: Arc<dyn TimeSource>,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    /// Creates `topic` if it does not exist yet.
    pub fn create_topic(&self, topic: &str) {
        self.state.lock().topics.entry(topic.to_string()).or_default();
    }

    /// Binds a new subscription to an existing topic.
    ///
    /// # Errors
    ///
    /// Fails if the topic does not exist or the subscription name is taken.
    pub fn subscribe(&self, topic: &str, subscription: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.subscriptions.contains_key(subscription) {
            return Err(Error::Broker {
                context: format!("subscription {subscription} already exists"),
            });
        }
        let Some(subs) = state.topics.get_mut(topic) else {
            return Err(Error::Broker {
                context: format!("topic {topic} does not exist"),
            });
        };
        subs.push(subscription.to_string());
        state.subscriptions.insert(
            subscription.to_string(),
            Subscription {
                topic: topic.to_string(),
                backlog: VecDeque::new(),
                ready: Arc::new(Notify::new()),
            },
        );
        Ok(())
    }

    /// Topic `subscription` is bound to, `None` if it does not exist.
    pub fn topic_of(&self, subscription: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .subscriptions
            .get(subscription)
            .map(|sub| sub.topic.clone())
    }

    /// Pulls and acknowledges up to `max` messages.
    pub fn pull(&self, subscription: &str, max: usize) -> Result<Vec<Message>> {
        let mut state = self.state.lock();
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| unknown_subscription(subscription))?;
        let n = max.min(sub.backlog.len());
        Ok(sub.backlog.drain(..n).collect())
    }

    /// Waits until a message is available on `subscription`, then pulls it.
    ///
    /// Intended for a single consumer per subscription.
    pub async fn receive(&self, subscription: &str) -> Result<Message> {
        loop {
            let ready = {
                let mut state = self.state.lock();
                let sub = state
                    .subscriptions
                    .get_mut(subscription)
                    .ok_or_else(|| unknown_subscription(subscription))?;
                if let Some(message) = sub.backlog.pop_front() {
                    return Ok(message);
                }
                Arc::clone(&sub.ready)
            };
            ready.notified().await;
        }
    }

    /// Number of undelivered messages retained by `subscription`.
    pub fn backlog_len(&self, subscription: &str) -> Result<usize> {
        let state = self.state.lock();
        state
            .subscriptions
            .get(subscription)
            .map(|sub| sub.backlog.len())
            .ok_or_else(|| unknown_subscription(subscription))
    }
}

fn unknown_subscription(subscription: &str) -> Error {
    Error::Broker {
        context: format!("subscription {subscription} does not exist"),
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<MessageId> {
        let mut state = self.state.lock();
        let Some(subs) = state.topics.get(topic).cloned() else {
            return Err(Error::Broker {
                context: format!("topic {topic} does not exist"),
            });
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let message = Message {
            id: id.clone(),
            data,
            publish_time: self.clock.now(),
        };
        for name in subs {
            if let Some(sub) = state.subscriptions.get_mut(&name) {
                sub.backlog.push_back(message.clone());
                // Stores a permit when nobody is waiting yet.
                sub.ready.notify_one();
            }
        }
        Ok(id)
    }

    async fn list_subscriptions(&self, topic: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        state.topics.get(topic).cloned().ok_or_else(|| Error::Broker {
            context: format!("topic {topic} does not exist"),
        })
    }

    async fn seek(&self, subscription: &str, to: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();
        let sub = state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| unknown_subscription(subscription))?;
        let before = sub.backlog.len();
        sub.backlog.retain(|message| message.publish_time >= to);
        tracing::debug!(
            subscription,
            topic = %sub.topic,
            dropped = before - sub.backlog.len(),
            "Seeked subscription"
        );
        Ok(())
    }
}
