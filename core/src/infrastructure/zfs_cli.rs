// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Builds [`ObservedState`] by shelling out to `zpool`/`zfs` through
//! the whitelisted [`Executor`] and parsing their machine-readable
//! `-H -p` output (spec §4.6).

use std::collections::BTreeMap;

use crate::domain::state::{Compression, DatasetProperties, ObservedDataset, ObservedPool, ObservedState, PoolHealth, PoolTopology};
use crate::infrastructure::executor::{Executor, ExecutorError};

#[derive(Debug, thiserror::Error)]
pub enum ZfsCliError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("unrecognized zpool health token {0:?}")]
    UnknownHealth(String),
    #[error("unexpected zpool list field count in line {0:?}")]
    MalformedLine(String),
}

pub struct ZfsCli<'a> {
    executor: &'a Executor,
}

impl<'a> ZfsCli<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    pub async fn observe(&self) -> Result<ObservedState, ZfsCliError> {
        let pools = self.observe_pools().await?;
        let datasets = self.observe_datasets().await?;
        Ok(ObservedState { pools, datasets, shares: BTreeMap::new() })
    }

    async fn observe_pools(&self) -> Result<BTreeMap<String, ObservedPool>, ZfsCliError> {
        let output = self.executor.run("zpool", &["list", "-H", "-p", "-o", "name,size,alloc,health"]).await?;
        let text = String::from_utf8_lossy(&output.stdout);

        let mut pools = BTreeMap::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split('\t').collect();
            let [name, size, alloc, health] = fields.as_slice() else {
                return Err(ZfsCliError::MalformedLine(line.to_string()));
            };
            let size_bytes: u64 = size.parse().unwrap_or(0);
            let used_bytes: u64 = alloc.parse().unwrap_or(0);
            let health = parse_pool_health(health)?;
            let devices = self.pool_devices(name).await?;
            pools.insert(
                name.to_string(),
                ObservedPool {
                    name: name.to_string(),
                    topology: infer_topology(devices.len()),
                    devices,
                    size_bytes,
                    used_bytes,
                    health,
                },
            );
        }
        Ok(pools)
    }

    async fn pool_devices(&self, pool: &str) -> Result<Vec<String>, ZfsCliError> {
        let output = self.executor.run("zpool", &["status", pool]).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .filter(|l| l.trim_start().starts_with("/dev/disk/by-id/"))
            .map(|l| l.split_whitespace().next().unwrap_or_default().to_string())
            .collect())
    }

    async fn observe_datasets(&self) -> Result<BTreeMap<String, ObservedDataset>, ZfsCliError> {
        let output = self
            .executor
            .run("zfs", &["list", "-H", "-p", "-t", "filesystem", "-o", "name,used,quota,compression,recordsize,encryption"])
            .await?;
        let text = String::from_utf8_lossy(&output.stdout);

        let mut datasets = BTreeMap::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split('\t').collect();
            let [name, used, quota, compression, recordsize, encryption] = fields.as_slice() else {
                return Err(ZfsCliError::MalformedLine(line.to_string()));
            };
            let parent_pool = name.split('/').next().unwrap_or(name).to_string();
            datasets.insert(
                name.to_string(),
                ObservedDataset {
                    parent_pool,
                    properties: DatasetProperties {
                        quota_bytes: quota.parse::<u64>().ok().filter(|q| *q != 0),
                        compression: parse_compression(compression),
                        recordsize_bytes: recordsize.parse().ok(),
                        encryption: *encryption != "off",
                    },
                    used_bytes: used.parse().unwrap_or(0),
                },
            );
        }
        Ok(datasets)
    }
}

fn parse_pool_health(token: &str) -> Result<PoolHealth, ZfsCliError> {
    match token {
        "ONLINE" => Ok(PoolHealth::Online),
        "DEGRADED" => Ok(PoolHealth::Degraded),
        "FAULTED" | "UNAVAIL" | "OFFLINE" => Ok(PoolHealth::Faulted),
        other => Err(ZfsCliError::UnknownHealth(other.to_string())),
    }
}

fn parse_compression(token: &str) -> Compression {
    match token {
        "lz4" => Compression::Lz4,
        "zstd" | "gzip" if token == "zstd" => Compression::Zstd,
        "gzip" => Compression::Gzip,
        _ => Compression::Off,
    }
}

/// Best-effort topology inference from device count alone; exact
/// raidz level is confirmed from the GitOps desired state, not
/// re-derived from observation (spec §4.6 notes this as approximate).
fn infer_topology(device_count: usize) -> PoolTopology {
    match device_count {
        0 | 1 => PoolTopology::Single,
        _ => PoolTopology::Mirror,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_health_tokens() {
        assert_eq!(parse_pool_health("ONLINE").unwrap(), PoolHealth::Online);
        assert_eq!(parse_pool_health("DEGRADED").unwrap(), PoolHealth::Degraded);
        assert_eq!(parse_pool_health("FAULTED").unwrap(), PoolHealth::Faulted);
    }

    #[test]
    fn rejects_unknown_health_token() {
        assert!(parse_pool_health("QUANTUM").is_err());
    }

    #[test]
    fn infers_single_vs_multi_device_topology() {
        assert_eq!(infer_topology(1), PoolTopology::Single);
        assert_eq!(infer_topology(2), PoolTopology::Mirror);
    }
}
