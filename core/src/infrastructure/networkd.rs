// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Writes systemd-networkd fragments under a reserved filename prefix
//! using atomic write-temp-then-rename, and probes for the host
//! capabilities GitOps application depends on (spec §4.7, §4.4).

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NetworkdError {
    #[error("network unit name {0:?} does not carry the reserved prefix {1:?}")]
    PrefixViolation(String, &'static str),
    #[error("io error writing {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

pub struct NetworkdWriter {
    network_dir: PathBuf,
    prefix: &'static str,
}

impl NetworkdWriter {
    pub fn new(network_dir: impl Into<PathBuf>, prefix: &'static str) -> Self {
        Self { network_dir: network_dir.into(), prefix }
    }

    /// Writes `contents` to `{prefix}{unit_name}.network`, refusing any
    /// unit name not already carrying the reserved prefix so D-PlaneOS
    /// never clobbers an operator-authored fragment.
    pub async fn write_unit(&self, unit_name: &str, contents: &str) -> Result<PathBuf, NetworkdError> {
        if !unit_name.starts_with(self.prefix) {
            return Err(NetworkdError::PrefixViolation(unit_name.to_string(), self.prefix));
        }
        let final_path = self.network_dir.join(format!("{unit_name}.network"));
        let tmp_path = self.network_dir.join(format!(".{unit_name}.{}.tmp", Uuid::new_v4()));

        self.write_atomic(&tmp_path, &final_path, contents).await?;
        Ok(final_path)
    }

    async fn write_atomic(&self, tmp_path: &Path, final_path: &Path, contents: &str) -> Result<(), NetworkdError> {
        let mut file = fs::File::create(tmp_path)
            .await
            .map_err(|source| NetworkdError::Io { path: tmp_path.to_path_buf(), source })?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|source| NetworkdError::Io { path: tmp_path.to_path_buf(), source })?;
        file.sync_all().await.map_err(|source| NetworkdError::Io { path: tmp_path.to_path_buf(), source })?;
        fs::rename(tmp_path, final_path)
            .await
            .map_err(|source| NetworkdError::Io { path: final_path.to_path_buf(), source })?;
        Ok(())
    }
}

/// Host capability probe taken once at boot (spec §4.4): features that
/// are unavailable are logged and the corresponding GitOps operations
/// are refused up front rather than failing mid-apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapabilities {
    pub can_write_systemd_network: bool,
    pub can_rewrite_nixos_fragment: bool,
    pub can_reload_samba: bool,
}

impl HostCapabilities {
    pub async fn discover(network_dir: &Path, nixos_fragment_path: &Path) -> Self {
        Self {
            can_write_systemd_network: is_writable_dir(network_dir).await,
            can_rewrite_nixos_fragment: is_writable_file(nixos_fragment_path).await,
            can_reload_samba: which("smbcontrol").await,
        }
    }
}

async fn is_writable_dir(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

async fn is_writable_file(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

async fn which(bin: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else { return false };
    for dir in path_var.split(':') {
        if fs::metadata(Path::new(dir).join(bin)).await.is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unit_name_without_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = NetworkdWriter::new(dir.path(), "50-dplane-");
        let err = writer.write_unit("00-operator-owned", "x").await.unwrap_err();
        assert!(matches!(err, NetworkdError::PrefixViolation(_, _)));
    }

    #[tokio::test]
    async fn writes_prefixed_unit_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let writer = NetworkdWriter::new(dir.path(), "50-dplane-");
        let path = writer.write_unit("50-dplane-lan0", "[Match]\nName=lan0\n").await.unwrap();
        let contents = fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("lan0"));
    }
}
