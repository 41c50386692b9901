// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! StateApplier — executes a plan sequentially against the whitelisted
//! Executor with optimistic concurrency and no roll-forward past a
//! failed item (spec §4.7).

use std::collections::HashSet;

use crate::domain::state::{Compression, DesiredState, PlanAction, PlanItem, PlanKind, PoolTopology};
use crate::domain::DplaneError;
use crate::infrastructure::executor::{Executor, ExecutorError};

#[derive(Debug)]
pub struct ApplyOutcome {
    pub applied: Vec<PlanItem>,
    pub deferred: Vec<PlanItem>,
}

pub struct StateApplier<'a> {
    executor: &'a Executor,
}

impl<'a> StateApplier<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// `approved_keys` holds `PlanItem::approval_key()` values approved
    /// for this specific plan hash; approvals never persist across
    /// plan regenerations (spec §4.7).
    pub async fn apply(
        &self,
        plan: &[PlanItem],
        desired: &DesiredState,
        approved_keys: &HashSet<String>,
        computed_against: &str,
        live_content_hash: &str,
    ) -> Result<ApplyOutcome, DplaneError> {
        if computed_against != live_content_hash {
            return Err(DplaneError::Conflict("desired state changed since plan was computed".into()));
        }

        let blocked_without_approval: Vec<&PlanItem> = plan
            .iter()
            .filter(|item| item.action == PlanAction::Blocked && !approved_keys.contains(&item.approval_key()))
            .collect();
        if !blocked_without_approval.is_empty() {
            return Err(DplaneError::Blocked {
                reason: format!(
                    "{} item(s) blocked pending approval: {}",
                    blocked_without_approval.len(),
                    blocked_without_approval.iter().map(|i| i.key.as_str()).collect::<Vec<_>>().join(", ")
                ),
            });
        }

        let mut applied = Vec::new();
        let mut deferred_from = None;

        for (index, item) in plan.iter().enumerate() {
            if !item.is_actionable() {
                applied.push(item.clone());
                continue;
            }
            match self.apply_one(item, desired).await {
                Ok(()) => applied.push(item.clone()),
                Err(err) => {
                    tracing::error!(key = %item.key, error = %err, "plan item failed, halting apply");
                    deferred_from = Some(index);
                    break;
                }
            }
        }

        let deferred = match deferred_from {
            Some(index) => plan[index..].to_vec(),
            None => Vec::new(),
        };

        Ok(ApplyOutcome { applied, deferred })
    }

    async fn apply_one(&self, item: &PlanItem, desired: &DesiredState) -> Result<(), DplaneError> {
        match (item.kind, item.action) {
            (PlanKind::Pool, PlanAction::Create) => self.create_pool(item, desired).await,
            (PlanKind::Pool, PlanAction::Delete) => self.destroy_pool(item).await,
            (PlanKind::Dataset, PlanAction::Create) => self.create_dataset(item).await,
            (PlanKind::Dataset, PlanAction::Delete) => self.destroy_dataset(item).await,
            (PlanKind::Dataset, PlanAction::Modify) => self.modify_dataset(item, desired).await,
            (PlanKind::Share, _) => {
                tracing::info!(key = %item.key, "share apply delegated to presentation-layer share service");
                Ok(())
            }
            (_, PlanAction::Blocked) => self.apply_approved_block(item).await,
            (_, PlanAction::Nop) => Ok(()),
            (kind, action) => Err(DplaneError::internal(anyhow::anyhow!("no handler for {kind:?}/{action:?}"))),
        }
    }

    /// Dispatches an approved BLOCKED item to the real operation it
    /// gates, keyed on why it was blocked. Only destroys have a safe
    /// automated action; data-movement reasons (topology or recordsize
    /// change, unstable device reference) stay manual even once
    /// approved — there is no automatic operation that performs a
    /// live data migration (spec §4.6).
    async fn apply_approved_block(&self, item: &PlanItem) -> Result<(), DplaneError> {
        match item.reason.as_str() {
            "pool-destroy-always-requires-approval" => self.destroy_pool(item).await,
            "dataset-has-data-requires-approval" => self.destroy_dataset(item).await,
            other => Err(DplaneError::Blocked {
                reason: format!("{other} requires manual intervention and has no automated apply path"),
            }),
        }
    }

    async fn create_pool(&self, item: &PlanItem, desired: &DesiredState) -> Result<(), DplaneError> {
        let pool = desired
            .pools
            .get(&item.key)
            .ok_or_else(|| DplaneError::internal(anyhow::anyhow!("plan references unknown desired pool {}", item.key)))?;

        let mut argv: Vec<&str> = vec!["create", &item.key];
        match pool.topology {
            PoolTopology::Single => {}
            PoolTopology::Mirror => argv.push("mirror"),
            PoolTopology::Raidz1 => argv.push("raidz1"),
            PoolTopology::Raidz2 => argv.push("raidz2"),
            PoolTopology::Raidz3 => argv.push("raidz3"),
        }
        argv.extend(pool.devices.iter().map(String::as_str));

        match self.executor.run("zpool", &argv).await {
            Ok(_) => Ok(()),
            Err(ExecutorError::NonZeroExit { stderr_tail, .. }) if stderr_tail.contains("already exists") => {
                tracing::info!(pool = %item.key, "zpool create: already exists, treating as success");
                Ok(())
            }
            Err(err) => Err(executor_err_to_dplane("zpool", err)),
        }
    }

    async fn destroy_pool(&self, item: &PlanItem) -> Result<(), DplaneError> {
        match self.executor.run("zpool", &["destroy", "-f", item.key.as_str()]).await {
            Ok(_) => Ok(()),
            Err(ExecutorError::NonZeroExit { stderr_tail, .. }) if stderr_tail.contains("no such pool") => {
                tracing::info!(pool = %item.key, "zpool destroy: already gone, treating as success");
                Ok(())
            }
            Err(err) => Err(executor_err_to_dplane("zpool", err)),
        }
    }

    async fn create_dataset(&self, item: &PlanItem) -> Result<(), DplaneError> {
        match self.executor.run("zfs", &["create", item.key.as_str()]).await {
            Ok(_) => Ok(()),
            Err(ExecutorError::NonZeroExit { stderr_tail, .. }) if stderr_tail.contains("already exists") => Ok(()),
            Err(err) => Err(executor_err_to_dplane("zfs", err)),
        }
    }

    async fn destroy_dataset(&self, item: &PlanItem) -> Result<(), DplaneError> {
        match self.executor.run("zfs", &["destroy", item.key.as_str()]).await {
            Ok(_) => Ok(()),
            Err(ExecutorError::NonZeroExit { stderr_tail, .. }) if stderr_tail.contains("dataset does not exist") => {
                Ok(())
            }
            Err(err) => Err(executor_err_to_dplane("zfs", err)),
        }
    }

    async fn modify_dataset(&self, item: &PlanItem, desired: &DesiredState) -> Result<(), DplaneError> {
        let dataset = desired
            .datasets
            .get(&item.key)
            .ok_or_else(|| DplaneError::internal(anyhow::anyhow!("plan references unknown desired dataset {}", item.key)))?;

        let compression = compression_token(dataset.properties.compression);
        let assignment = format!("compression={compression}");
        self.executor
            .run("zfs", &["set", &assignment, item.key.as_str()])
            .await
            .map(|_| ())
            .map_err(|err| executor_err_to_dplane("zfs", err))
    }
}

fn compression_token(compression: Compression) -> &'static str {
    match compression {
        Compression::Off => "off",
        Compression::Lz4 => "lz4",
        Compression::Zstd => "zstd",
        Compression::Gzip => "gzip",
    }
}

fn executor_err_to_dplane(tool: &str, err: ExecutorError) -> DplaneError {
    match err {
        ExecutorError::NotWhitelisted(_) | ExecutorError::ForbiddenByte(_) => {
            DplaneError::InputInvalid { reason: err.to_string() }
        }
        ExecutorError::Timeout(d) => DplaneError::Timeout(d),
        ExecutorError::NonZeroExit { tool, exit_code, stderr_tail } => {
            DplaneError::ExternalFailure { tool, exit_code, stderr_tail }
        }
        ExecutorError::OutputTooLarge(_) | ExecutorError::Spawn { .. } => {
            DplaneError::ExternalFailure { tool: tool.to_string(), exit_code: -1, stderr_tail: err.to_string() }
        }
    }
}

pub fn content_hash_matches(plan_against: &str, desired: &DesiredState) -> bool {
    plan_against == desired.content_hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::Whitelist;
    use crate::domain::state::Risk;

    fn whitelist() -> Whitelist {
        Whitelist::standard()
    }

    #[tokio::test]
    async fn mismatched_content_hash_rejects_apply() {
        let executor = Executor::new(whitelist());
        let applier = StateApplier::new(&executor);
        let desired = DesiredState::default();
        let plan = vec![];
        let err = applier.apply(&plan, &desired, &HashSet::new(), "a", "b").await.unwrap_err();
        assert!(matches!(err, DplaneError::Conflict(_)));
    }

    #[tokio::test]
    async fn blocked_item_without_approval_rejects_apply() {
        let executor = Executor::new(whitelist());
        let applier = StateApplier::new(&executor);
        let desired = DesiredState::default();
        let plan = vec![PlanItem {
            kind: PlanKind::Pool,
            key: "tank".into(),
            action: PlanAction::Blocked,
            risk: Risk::Irreversible,
            reason: "pool-destroy-always-requires-approval".into(),
            requires_approval: true,
        }];
        let content_hash = desired.content_hash();
        let err = applier.apply(&plan, &desired, &HashSet::new(), &content_hash, &content_hash).await.unwrap_err();
        assert!(matches!(err, DplaneError::Blocked { .. }));
    }

    #[tokio::test]
    async fn approved_pool_destroy_proceeds_past_the_block() {
        let executor = Executor::new(whitelist());
        let applier = StateApplier::new(&executor);
        let desired = DesiredState::default();
        let plan = vec![PlanItem {
            kind: PlanKind::Pool,
            key: "tank".into(),
            action: PlanAction::Blocked,
            risk: Risk::Irreversible,
            reason: "pool-destroy-always-requires-approval".into(),
            requires_approval: true,
        }];
        let content_hash = desired.content_hash();
        let mut approved = HashSet::new();
        approved.insert("pool:tank".to_string());

        // The block is lifted, so apply_one dispatches to the real
        // destroy_pool operation instead of failing with Blocked. The argv
        // it builds must actually clear the whitelist — if it didn't, this
        // would surface as InputInvalid/NotWhitelisted, which would look
        // superficially like "not Blocked" but really means the approval
        // never reached the process boundary. In this sandbox `zpool`
        // isn't on PATH, so a whitelisted argv fails at spawn instead.
        let err = applier.apply(&plan, &desired, &approved, &content_hash, &content_hash).await.unwrap_err();
        assert!(matches!(err, DplaneError::ExternalFailure { .. } | DplaneError::Timeout(_)));
    }

    #[tokio::test]
    async fn unapprovable_topology_change_stays_blocked_even_with_approval() {
        let executor = Executor::new(whitelist());
        let applier = StateApplier::new(&executor);
        let desired = DesiredState::default();
        let plan = vec![PlanItem {
            kind: PlanKind::Pool,
            key: "tank".into(),
            action: PlanAction::Blocked,
            risk: Risk::Irreversible,
            reason: "topology-change-requires-data-movement".into(),
            requires_approval: true,
        }];
        let content_hash = desired.content_hash();
        let mut approved = HashSet::new();
        approved.insert("pool:tank".to_string());

        let err = applier.apply(&plan, &desired, &approved, &content_hash, &content_hash).await.unwrap_err();
        assert!(matches!(err, DplaneError::Blocked { .. }));
    }

    #[tokio::test]
    async fn empty_plan_applies_with_zero_executor_calls() {
        let executor = Executor::new(whitelist());
        let applier = StateApplier::new(&executor);
        let desired = DesiredState::default();
        let content_hash = desired.content_hash();
        let outcome = applier.apply(&[], &desired, &HashSet::new(), &content_hash, &content_hash).await.unwrap();
        assert!(outcome.applied.is_empty());
        assert!(outcome.deferred.is_empty());
    }
}
