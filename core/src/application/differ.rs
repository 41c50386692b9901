// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! StateDiffer — computes a classified plan from desired vs observed
//! state (spec §4.6).

use crate::domain::state::{
    DatasetProperties, DesiredDataset, DesiredPool, DesiredShare, DesiredState, ObservedDataset, ObservedPool,
    ObservedShare, ObservedState, PlanAction, PlanItem, PlanKind, Risk,
};

pub struct StateDiffer;

impl StateDiffer {
    /// Produces the ordered plan: CREATE before MODIFY before DELETE;
    /// within CREATE, pool before dataset before share; within DELETE
    /// the reverse; ties broken alphabetically on key (spec §4.6).
    pub fn diff(desired: &DesiredState, observed: &ObservedState) -> Vec<PlanItem> {
        let mut creates = Vec::new();
        let mut modifies = Vec::new();
        let mut deletes = Vec::new();

        Self::diff_pools(desired, observed, &mut creates, &mut modifies, &mut deletes);
        Self::diff_datasets(desired, observed, &mut creates, &mut modifies, &mut deletes);
        Self::diff_shares(desired, observed, &mut creates, &mut modifies, &mut deletes);

        creates.sort_by(|a, b| a.key.cmp(&b.key));
        modifies.sort_by(|a, b| a.key.cmp(&b.key));
        deletes.sort_by(|a, b| b.key.cmp(&a.key));

        let mut plan = Vec::with_capacity(creates.len() + modifies.len() + deletes.len());
        plan.extend(creates);
        plan.extend(modifies);
        plan.extend(deletes);
        plan
    }

    fn diff_pools(
        desired: &DesiredState,
        observed: &ObservedState,
        creates: &mut Vec<PlanItem>,
        modifies: &mut Vec<PlanItem>,
        deletes: &mut Vec<PlanItem>,
    ) {
        for (name, pool) in &desired.pools {
            match observed.pools.get(name) {
                None => {
                    if let Some(item) = unstable_device_check(PlanKind::Pool, name, &pool.devices) {
                        modifies.push(item);
                        continue;
                    }
                    creates.push(PlanItem {
                        kind: PlanKind::Pool,
                        key: name.clone(),
                        action: PlanAction::Create,
                        risk: Risk::High,
                        reason: "pool does not exist".into(),
                        requires_approval: false,
                    });
                }
                Some(obs) => {
                    if let Some(item) = Self::compare_pool(name, pool, obs) {
                        modifies.push(item);
                    }
                }
            }
        }

        for name in observed.pools.keys() {
            if !desired.pools.contains_key(name) {
                deletes.push(PlanItem {
                    kind: PlanKind::Pool,
                    key: name.clone(),
                    action: PlanAction::Blocked,
                    risk: Risk::Irreversible,
                    reason: "pool-destroy-always-requires-approval".into(),
                    requires_approval: true,
                });
            }
        }
    }

    fn compare_pool(name: &str, desired: &DesiredPool, observed: &ObservedPool) -> Option<PlanItem> {
        if let Some(item) = unstable_device_check(PlanKind::Pool, name, &desired.devices) {
            return Some(item);
        }
        if desired.topology != observed.topology {
            return Some(PlanItem {
                kind: PlanKind::Pool,
                key: name.to_string(),
                action: PlanAction::Blocked,
                risk: Risk::Irreversible,
                reason: "topology-change-requires-data-movement".into(),
                requires_approval: true,
            });
        }
        None
    }

    fn diff_datasets(
        desired: &DesiredState,
        observed: &ObservedState,
        creates: &mut Vec<PlanItem>,
        modifies: &mut Vec<PlanItem>,
        deletes: &mut Vec<PlanItem>,
    ) {
        for (path, dataset) in &desired.datasets {
            match observed.datasets.get(path) {
                None => creates.push(PlanItem {
                    kind: PlanKind::Dataset,
                    key: path.clone(),
                    action: PlanAction::Create,
                    risk: Risk::Medium,
                    reason: "dataset does not exist".into(),
                    requires_approval: false,
                }),
                Some(obs) => {
                    if let Some(item) = Self::compare_dataset(path, dataset, obs) {
                        modifies.push(item);
                    }
                }
            }
        }

        for (path, obs) in &observed.datasets {
            if !desired.datasets.contains_key(path) {
                let (action, risk, reason, requires_approval) = if obs.used_bytes > 0 {
                    (PlanAction::Blocked, Risk::Irreversible, "dataset-has-data-requires-approval", true)
                } else {
                    (PlanAction::Delete, Risk::Medium, "dataset-empty", false)
                };
                deletes.push(PlanItem {
                    kind: PlanKind::Dataset,
                    key: path.clone(),
                    action,
                    risk,
                    reason: reason.into(),
                    requires_approval,
                });
            }
        }
    }

    fn compare_dataset(path: &str, desired: &DesiredDataset, observed: &ObservedDataset) -> Option<PlanItem> {
        let d = &desired.properties;
        let o = &observed.properties;

        if recordsize_requires_movement(d, o) {
            return Some(PlanItem {
                kind: PlanKind::Dataset,
                key: path.to_string(),
                action: PlanAction::Blocked,
                risk: Risk::Irreversible,
                reason: "recordsize-change-requires-data-movement".into(),
                requires_approval: true,
            });
        }

        if d.quota_bytes != o.quota_bytes || d.compression != o.compression || d.encryption != o.encryption {
            return Some(PlanItem {
                kind: PlanKind::Dataset,
                key: path.to_string(),
                action: PlanAction::Modify,
                risk: Risk::Low,
                reason: "property drift".into(),
                requires_approval: false,
            });
        }

        None
    }

    fn diff_shares(
        desired: &DesiredState,
        observed: &ObservedState,
        creates: &mut Vec<PlanItem>,
        modifies: &mut Vec<PlanItem>,
        deletes: &mut Vec<PlanItem>,
    ) {
        for (mount, share) in &desired.shares {
            match observed.shares.get(mount) {
                None => creates.push(PlanItem {
                    kind: PlanKind::Share,
                    key: mount.clone(),
                    action: PlanAction::Create,
                    risk: Risk::Low,
                    reason: "share does not exist".into(),
                    requires_approval: false,
                }),
                Some(obs) => {
                    if let Some(item) = Self::compare_share(mount, share, obs) {
                        modifies.push(item);
                    }
                }
            }
        }

        for (mount, obs) in &observed.shares {
            if !desired.shares.contains_key(mount) {
                let (action, reason, requires_approval) = if obs.live_connection_count > 0 {
                    (PlanAction::Blocked, "share-has-live-connections", true)
                } else {
                    (PlanAction::Delete, "share-idle", false)
                };
                deletes.push(PlanItem {
                    kind: PlanKind::Share,
                    key: mount.clone(),
                    action,
                    risk: Risk::Low,
                    reason: reason.into(),
                    requires_approval,
                });
            }
        }
    }

    fn compare_share(mount: &str, desired: &DesiredShare, observed: &ObservedShare) -> Option<PlanItem> {
        if desired.export_type != observed.export_type
            || desired.acl.read_write != observed.acl.read_write
            || desired.acl.read_only != observed.acl.read_only
        {
            return Some(PlanItem {
                kind: PlanKind::Share,
                key: mount.to_string(),
                action: PlanAction::Modify,
                risk: Risk::Low,
                reason: "acl or export type drift".into(),
                requires_approval: false,
            });
        }
        None
    }
}

fn recordsize_requires_movement(desired: &DatasetProperties, observed: &DatasetProperties) -> bool {
    desired.recordsize_bytes != observed.recordsize_bytes && observed.recordsize_bytes.is_some()
}

/// Any device not under `/dev/disk/by-id/` fails closed per spec §3/§4.6.
fn unstable_device_check(kind: PlanKind, key: &str, devices: &[String]) -> Option<PlanItem> {
    devices.iter().find(|d| !d.starts_with("/dev/disk/by-id/")).map(|_| PlanItem {
        kind,
        key: key.to_string(),
        action: PlanAction::Blocked,
        risk: Risk::Irreversible,
        reason: "unstable-device-reference".into(),
        requires_approval: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{PoolHealth, PoolTopology};

    fn desired_mirror(devices: Vec<&str>) -> DesiredState {
        let mut d = DesiredState::default();
        d.pools.insert(
            "tank".into(),
            DesiredPool { name: "tank".into(), topology: PoolTopology::Mirror, devices: devices.into_iter().map(String::from).collect() },
        );
        d
    }

    #[test]
    fn missing_pool_is_a_create() {
        let desired = desired_mirror(vec!["/dev/disk/by-id/ata-WDC-X", "/dev/disk/by-id/ata-WDC-Y"]);
        let observed = ObservedState::default();
        let plan = StateDiffer::diff(&desired, &observed);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].action, PlanAction::Create);
        assert_eq!(plan[0].risk, Risk::High);
    }

    #[test]
    fn unstable_device_reference_is_blocked() {
        let desired = desired_mirror(vec!["/dev/sdb"]);
        let observed = ObservedState::default();
        let plan = StateDiffer::diff(&desired, &observed);
        assert_eq!(plan[0].action, PlanAction::Blocked);
        assert_eq!(plan[0].reason, "unstable-device-reference");
    }

    #[test]
    fn pool_destroy_is_always_blocked_pending_approval() {
        let desired = DesiredState::default();
        let mut observed = ObservedState::default();
        observed.pools.insert(
            "tank".into(),
            ObservedPool {
                name: "tank".into(),
                topology: PoolTopology::Mirror,
                devices: vec![],
                size_bytes: 100 * 1024 * 1024 * 1024,
                used_bytes: 10 * 1024 * 1024 * 1024,
                health: PoolHealth::Online,
            },
        );
        let plan = StateDiffer::diff(&desired, &observed);
        assert_eq!(plan[0].action, PlanAction::Blocked);
        assert!(plan[0].requires_approval);
        assert_eq!(plan[0].reason, "pool-destroy-always-requires-approval");
    }

    #[test]
    fn empty_dataset_delete_does_not_require_approval() {
        let desired = DesiredState::default();
        let mut observed = ObservedState::default();
        observed.datasets.insert(
            "tank/scratch".into(),
            ObservedDataset { parent_pool: "tank".into(), properties: DatasetProperties::default(), used_bytes: 0 },
        );
        let plan = StateDiffer::diff(&desired, &observed);
        assert_eq!(plan[0].action, PlanAction::Delete);
        assert!(!plan[0].requires_approval);
    }

    #[test]
    fn dataset_with_data_blocks_delete() {
        let desired = DesiredState::default();
        let mut observed = ObservedState::default();
        observed.datasets.insert(
            "tank/scratch".into(),
            ObservedDataset { parent_pool: "tank".into(), properties: DatasetProperties::default(), used_bytes: 1 },
        );
        let plan = StateDiffer::diff(&desired, &observed);
        assert_eq!(plan[0].action, PlanAction::Blocked);
        assert!(plan[0].requires_approval);
    }

    #[test]
    fn idempotent_plan_is_empty_when_states_match() {
        let desired = desired_mirror(vec!["/dev/disk/by-id/ata-WDC-X"]);
        let mut observed = ObservedState::default();
        observed.pools.insert(
            "tank".into(),
            ObservedPool {
                name: "tank".into(),
                topology: PoolTopology::Mirror,
                devices: vec!["/dev/disk/by-id/ata-WDC-X".into()],
                size_bytes: 100 * 1024 * 1024 * 1024,
                used_bytes: 0,
                health: PoolHealth::Online,
            },
        );
        let plan = StateDiffer::diff(&desired, &observed);
        assert!(plan.is_empty());
    }
}
