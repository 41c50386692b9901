// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain events published through the EventHub (spec §4.9). Topic
//! names are `<domain>.<event>`; `topic()` is the single source of
//! truth so a subscriber's interest string and a publisher's envelope
//! can never drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::PlanItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DomainEvent {
    ZfsPoolCreated { pool: String },
    ZfsPoolDegraded { pool: String },
    ZfsPoolDown { pool: String },
    ZfsCapacityReleased { pool: String, bytes_released: u64 },
    DockerContainerStopping { container: String, pool: String },
    GitopsDrift { plan: Vec<PlanItem> },
    GitopsPlanApplied { plan_hash: String },
    AlertFiring { key: String, message: String },
    AlertResolved { key: String },
    SubscriberEvicted { subscriber_id: uuid::Uuid, topic: String },
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::ZfsPoolCreated { .. } => "zfs.pool.created",
            DomainEvent::ZfsPoolDegraded { .. } => "zfs.pool.degraded",
            DomainEvent::ZfsPoolDown { .. } => "zfs.pool.down",
            DomainEvent::ZfsCapacityReleased { .. } => "zfs.capacity.released",
            DomainEvent::DockerContainerStopping { .. } => "docker.container.stopping",
            DomainEvent::GitopsDrift { .. } => "gitops.drift",
            DomainEvent::GitopsPlanApplied { .. } => "gitops.plan.applied",
            DomainEvent::AlertFiring { .. } => "alert.firing",
            DomainEvent::AlertResolved { .. } => "alert.resolved",
            DomainEvent::SubscriberEvicted { .. } => "subscriber.evicted",
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            DomainEvent::ZfsPoolDown { .. } | DomainEvent::AlertFiring { .. } => EventLevel::Critical,
            DomainEvent::ZfsPoolDegraded { .. } | DomainEvent::DockerContainerStopping { .. } => EventLevel::Warn,
            DomainEvent::SubscriberEvicted { .. } => EventLevel::Warn,
            _ => EventLevel::Info,
        }
    }

    pub fn envelope(&self, ts: DateTime<Utc>) -> EventEnvelope {
        EventEnvelope {
            topic: self.topic().to_string(),
            ts,
            level: self.level(),
            payload: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// The wire shape pushed to WebSocket subscribers (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub ts: DateTime<Utc>,
    pub level: EventLevel,
    pub payload: serde_json::Value,
}
