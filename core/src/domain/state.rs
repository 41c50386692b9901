// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! DesiredState / ObservedState / PlanItem (spec §3, §4.6, §4.7).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolTopology {
    Single,
    Mirror,
    Raidz1,
    Raidz2,
    Raidz3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredPool {
    pub name: String,
    pub topology: PoolTopology,
    /// Must be `/dev/disk/by-id/...` — any transient path fails parsing
    /// closed per spec §3.
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Off,
    Lz4,
    Zstd,
    Gzip,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetProperties {
    pub quota_bytes: Option<u64>,
    #[serde(default)]
    pub compression: Compression,
    pub recordsize_bytes: Option<u32>,
    #[serde(default)]
    pub encryption: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredDataset {
    pub parent_pool: String,
    pub properties: DatasetProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportType {
    Smb,
    Nfs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAcl {
    pub read_write: Vec<String>,
    pub read_only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredShare {
    pub dataset_path: String,
    pub export_type: ExportType,
    pub acl: ShareAcl,
}

/// The GitOps document (spec §3). A closed schema: `#[serde(deny_unknown_fields)]`
/// on every member type makes unknown keys a parse error, not a warning,
/// per the redesign note in spec §9.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredState {
    #[serde(default)]
    pub pools: BTreeMap<String, DesiredPool>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DesiredDataset>,
    #[serde(default)]
    pub shares: BTreeMap<String, DesiredShare>,
}

impl DesiredState {
    /// Content hash used for the optimistic-concurrency check in
    /// StateApplier (spec §4.7). Canonicalized via serde_json so field
    /// order never affects the hash.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).expect("DesiredState always serializes");
        blake3::hash(&canonical).to_hex().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolHealth {
    Online,
    Degraded,
    Faulted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPool {
    pub name: String,
    pub topology: PoolTopology,
    pub devices: Vec<String>,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub health: PoolHealth,
}

impl ObservedPool {
    /// Used-fraction as consumed by CapacityGuardian (spec §4.4). Zero
    /// capacity reads as fully used rather than dividing by zero.
    pub fn used_fraction(&self) -> f64 {
        if self.size_bytes == 0 {
            return 1.0;
        }
        self.used_bytes as f64 / self.size_bytes as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedDataset {
    pub parent_pool: String,
    pub properties: DatasetProperties,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedShare {
    pub dataset_path: String,
    pub export_type: ExportType,
    pub acl: ShareAcl,
    pub live_connection_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub pools: BTreeMap<String, ObservedPool>,
    pub datasets: BTreeMap<String, ObservedDataset>,
    pub shares: BTreeMap<String, ObservedShare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Pool,
    Dataset,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanAction {
    Create,
    Modify,
    Delete,
    Nop,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
    Irreversible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub kind: PlanKind,
    pub key: String,
    pub action: PlanAction,
    pub risk: Risk,
    pub reason: String,
    pub requires_approval: bool,
}

impl PlanItem {
    pub fn approval_key(&self) -> String {
        let kind = match self.kind {
            PlanKind::Pool => "pool",
            PlanKind::Dataset => "dataset",
            PlanKind::Share => "share",
        };
        format!("{kind}:{}", self.key)
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self.action, PlanAction::Nop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_across_field_order() {
        let mut a = DesiredState::default();
        a.pools.insert(
            "tank".into(),
            DesiredPool {
                name: "tank".into(),
                topology: PoolTopology::Mirror,
                devices: vec!["/dev/disk/by-id/ata-X".into()],
            },
        );
        let b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_changes_with_content() {
        let a = DesiredState::default();
        let mut b = DesiredState::default();
        b.pools.insert(
            "tank".into(),
            DesiredPool {
                name: "tank".into(),
                topology: PoolTopology::Single,
                devices: vec![],
            },
        );
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn unknown_key_fails_to_parse() {
        let doc = r#"{"pools":{},"datasets":{},"shares":{},"extra":1}"#;
        assert!(serde_json::from_str::<DesiredState>(doc).is_err());
    }
}
