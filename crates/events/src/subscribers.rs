//! An enumerable set of subscribers, each with its own channel.
//!
//! Unlike the [`EventBus`](crate::EventBus), every subscriber here is
//! registered under an id and optionally a topic, so the owner can list,
//! target and drop them. Used to push saved timelines to the device layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

pub type SubscriberSender<T> = mpsc::UnboundedSender<T>;

struct Subscriber<T> {
    /// Only messages for this topic are delivered; `None` receives all.
    topic: Option<String>,
    sender: SubscriberSender<T>,
    #[allow(dead_code)]
    subscribed_at: DateTime<Utc>,
}

/// Thread-safe via interior `RwLock`; wrap in `Arc` to share.
pub struct SubscriberRegistry<T> {
    subscribers: RwLock<HashMap<String, Subscriber<T>>>,
}

impl<T: Clone> SubscriberRegistry<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber, replacing one with the same id.
    ///
    /// Returns the receiving half of its channel.
    pub async fn add(&self, id: impl Into<String>, topic: Option<String>) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber {
            topic,
            sender: tx,
            subscribed_at: Utc::now(),
        };
        self.subscribers.write().await.insert(id.into(), subscriber);
        rx
    }

    pub async fn remove(&self, id: &str) {
        self.subscribers.write().await.remove(id);
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscribers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Send to every subscriber of `topic` and to the catch-all ones.
    ///
    /// Subscribers whose receiver was dropped are removed. Returns the
    /// number of subscribers reached.
    pub async fn publish(&self, topic: &str, message: T) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                if subscriber.topic.as_deref().is_some_and(|t| t != topic) {
                    continue;
                }
                match subscriber.sender.send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &closed {
                subscribers.remove(id);
            }
            tracing::debug!(count = closed.len(), "Pruned closed subscribers");
        }
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl<T: Clone> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
