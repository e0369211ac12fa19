//! Event bus seam and an in-process hub.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::event::ActionEvent;

/// Handler invoked for matching events. `Some` is the reply sent back to
/// the event's source.
pub type EventCallback =
    Arc<dyn Fn(ActionEvent) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

/// Which events a callback receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// Every event on a topic.
    Topic(String),
    /// Events on a topic addressed to one action identifier.
    Action { topic: String, identifier: String },
}

impl Subscription {
    pub fn matches(&self, event: &ActionEvent) -> bool {
        match self {
            Self::Topic(topic) => event.topic == *topic,
            Self::Action { topic, identifier } => {
                event.topic == *topic
                    && event.data.action_identifier.as_deref() == Some(identifier.as_str())
            }
        }
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(topic) => write!(f, "topic={topic}"),
            Self::Action { topic, identifier } => {
                write!(f, "topic={topic} and data.actionIdentifier={identifier}")
            }
        }
    }
}

/// The platform's event bus, as far as actions are concerned.
#[async_trait]
pub trait EventHub: Send + Sync {
    async fn subscribe(&self, subscription: Subscription, callback: EventCallback);
}

/// Hub that dispatches published events to subscribers in-process.
#[derive(Default)]
pub struct LocalEventHub {
    subscribers: RwLock<Vec<(Subscription, EventCallback)>>,
}

impl LocalEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every matching subscriber, in subscription order,
    /// and collect their replies.
    pub async fn publish(&self, event: ActionEvent) -> Vec<Value> {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .await
            .iter()
            .filter(|(subscription, _)| subscription.matches(&event))
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        debug!(topic = %event.topic, subscribers = callbacks.len(), "Publishing event");

        let mut replies = Vec::new();
        for callback in callbacks {
            if let Some(reply) = callback(event.clone()).await {
                replies.push(reply);
            }
        }
        replies
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[async_trait]
impl EventHub for LocalEventHub {
    async fn subscribe(&self, subscription: Subscription, callback: EventCallback) {
        debug!(subscription = %subscription, "Subscribed");
        self.subscribers.write().await.push((subscription, callback));
    }
}
