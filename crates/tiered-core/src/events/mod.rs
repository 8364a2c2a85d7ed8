//! Event Bus - topic-structured publish/subscribe for swarm observers.
//!
//! Topics follow `swarm.<category>.<event>`, e.g. `swarm.lifecycle.started`.
//! Subscription patterns are matched segment by segment:
//!   - `*` matches exactly one segment
//!   - a trailing `#` matches all remaining segments (including none)
//!
//! Handlers are fire-and-forget: each delivery runs on its own task so a slow
//! observer never blocks the producer. A bounded history lets observers that
//! attach late catch up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

const HISTORY_LIMIT: usize = 256;

/// Topic categories published by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Lifecycle,
    Resource,
    Team,
    Metacognition,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::Resource => "resource",
            Self::Team => "team",
            Self::Metacognition => "metacognition",
        }
    }
}

/// Build a `swarm.<category>.<event>` topic.
pub fn swarm_topic(category: EventCategory, event: &str) -> String {
    format!("swarm.{}.{}", category.as_str(), event)
}

/// An event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEvent {
    pub id: String,
    pub topic: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

type EventHandler = Arc<dyn Fn(BusEvent) + Send + Sync>;

struct Subscription {
    pattern: String,
    handler: EventHandler,
}

struct EventBusInner {
    subscriptions: HashMap<String, Subscription>,
    history: VecDeque<BusEvent>,
}

/// Thread-safe event bus. Cloning shares the same subscriptions.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<RwLock<EventBusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EventBusInner {
                subscriptions: HashMap::new(),
                history: VecDeque::with_capacity(HISTORY_LIMIT),
            })),
        }
    }

    // ─── Subscribe ──────────────────────────────────────────────────────

    /// Subscribe a handler to a topic pattern. Returns the subscription ID.
    pub async fn subscribe<F>(&self, pattern: &str, handler: F) -> String
    where
        F: Fn(BusEvent) + Send + Sync + 'static,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let mut inner = self.inner.write().await;
        inner.subscriptions.insert(
            id.clone(),
            Subscription {
                pattern: pattern.to_string(),
                handler: Arc::new(handler),
            },
        );
        tracing::debug!("[EventBus] Subscribed {} to '{}'", id, pattern);
        id
    }

    /// Remove a subscription.
    pub async fn unsubscribe(&self, subscription_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.subscriptions.remove(subscription_id).is_some()
    }

    // ─── Publish ────────────────────────────────────────────────────────

    /// Publish an event to every subscription whose pattern matches the topic.
    pub async fn publish(&self, topic: &str, data: serde_json::Value) -> BusEvent {
        let event = BusEvent {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            data,
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.write().await;

        for sub in inner.subscriptions.values() {
            if !topic_matches(&sub.pattern, topic) {
                continue;
            }
            let handler = sub.handler.clone();
            let event = event.clone();
            tokio::spawn(async move {
                handler(event);
            });
        }

        if inner.history.len() >= HISTORY_LIMIT {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());

        tracing::debug!("[EventBus] Published {}", topic);
        event
    }

    /// Recently published events matching a pattern, oldest first.
    pub async fn recent(&self, pattern: &str) -> Vec<BusEvent> {
        let inner = self.inner.read().await;
        inner
            .history
            .iter()
            .filter(|e| topic_matches(pattern, &e.topic))
            .cloned()
            .collect()
    }

    pub async fn subscription_count(&self) -> usize {
        self.inner.read().await.subscriptions.len()
    }
}

/// Match a dot-separated topic against a pattern with `*` and trailing `#`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();

    for (i, segment) in pattern.iter().enumerate() {
        if *segment == "#" && i == pattern.len() - 1 {
            return true;
        }
        match topic.get(i) {
            Some(t) if *segment == "*" || segment == t => continue,
            _ => return false,
        }
    }
    pattern.len() == topic.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("swarm.lifecycle.started", "swarm.lifecycle.started"));
        assert!(topic_matches("swarm.*.started", "swarm.lifecycle.started"));
        assert!(topic_matches("swarm.#", "swarm.resource.limit_exceeded"));
        assert!(topic_matches("swarm.team.#", "swarm.team"));
        assert!(!topic_matches("swarm.*", "swarm.lifecycle.started"));
        assert!(!topic_matches("swarm.lifecycle.started", "swarm.lifecycle"));
        assert!(!topic_matches("swarm.team.*", "swarm.resource.allocated"));
    }

    #[test]
    fn test_swarm_topic() {
        assert_eq!(
            swarm_topic(EventCategory::Metacognition, "stalled"),
            "swarm.metacognition.stalled"
        );
    }

    #[tokio::test]
    async fn test_publish_delivers_to_matching_subscribers() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe("swarm.lifecycle.*", move |event| {
            let _ = tx.send(event.topic);
        })
        .await;

        bus.publish("swarm.resource.allocated", serde_json::json!({})).await;
        bus.publish("swarm.lifecycle.started", serde_json::json!({ "swarmId": "s1" }))
            .await;

        let topic = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("handler not called")
            .unwrap();
        assert_eq!(topic, "swarm.lifecycle.started");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_and_history() {
        let bus = EventBus::new();
        let id = bus.subscribe("#", |_| {}).await;
        assert_eq!(bus.subscription_count().await, 1);
        assert!(bus.unsubscribe(&id).await);
        assert!(!bus.unsubscribe(&id).await);

        for i in 0..(HISTORY_LIMIT + 10) {
            bus.publish("swarm.resource.usage_recorded", serde_json::json!({ "i": i }))
                .await;
        }
        bus.publish("swarm.team.formed", serde_json::json!({})).await;

        assert_eq!(bus.recent("swarm.team.#").await.len(), 1);
        let usage = bus.recent("swarm.resource.*").await;
        assert_eq!(usage.len(), HISTORY_LIMIT - 1);
        assert_eq!(usage[0].data["i"], 11);
    }
}
