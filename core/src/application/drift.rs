// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! DriftDetector — periodically recomputes ObservedState and diffs it
//! against the committed DesiredState, publishing `gitops.drift` when
//! reality has moved. Never mutates (spec §4.8).

use std::sync::Arc;

use rand::Rng;
use tokio::time::{sleep, Duration};

use crate::application::differ::StateDiffer;
use crate::domain::events::DomainEvent;
use crate::domain::repository::GitopsStateRepository;
use crate::infrastructure::event_bus::EventHub;
use crate::infrastructure::executor::Executor;
use crate::infrastructure::zfs_cli::ZfsCli;

const BASE_INTERVAL: Duration = Duration::from_secs(300);
const JITTER: Duration = Duration::from_secs(30);

pub struct DriftDetector {
    executor: Arc<Executor>,
    gitops: Arc<dyn GitopsStateRepository>,
    events: Arc<EventHub>,
}

impl DriftDetector {
    pub fn new(executor: Arc<Executor>, gitops: Arc<dyn GitopsStateRepository>, events: Arc<EventHub>) -> Self {
        Self { executor, gitops, events }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                sleep(jittered_interval()).await;
                if let Err(err) = self.check_once().await {
                    tracing::error!(error = %err, "drift check failed");
                }
            }
        })
    }

    async fn check_once(&self) -> anyhow::Result<()> {
        let Some(desired) = self.gitops.current().await? else {
            return Ok(());
        };
        let observed = ZfsCli::new(&self.executor).observe().await?;
        let plan = StateDiffer::diff(&desired, &observed);

        if plan.iter().any(|item| item.is_actionable()) {
            tracing::warn!(items = plan.len(), "drift detected against committed desired state");
            self.events.publish(DomainEvent::GitopsDrift { plan }, chrono::Utc::now());
        }
        Ok(())
    }
}

fn jittered_interval() -> Duration {
    let delta: i64 = rand::thread_rng().gen_range(-(JITTER.as_secs() as i64)..=(JITTER.as_secs() as i64));
    let seconds = (BASE_INTERVAL.as_secs() as i64 + delta).max(1) as u64;
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_interval_stays_within_bounds() {
        for _ in 0..100 {
            let interval = jittered_interval();
            assert!(interval >= BASE_INTERVAL - JITTER);
            assert!(interval <= BASE_INTERVAL + JITTER);
        }
    }
}
