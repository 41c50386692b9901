// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon process lifecycle: detection via PID file + HTTP health
//! check, graceful stop, PID file management.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
#[cfg(unix)]
use tokio::time::sleep;
use tracing::info;
#[cfg(unix)]
use tracing::warn;

pub mod client;
#[cfg(unix)]
pub mod install;
pub mod server;

pub use client::DaemonClient;

#[cfg(unix)]
const PID_FILE: &str = "/var/run/dplaned/dplaned.pid";
#[cfg(unix)]
const PID_FILE_FALLBACK: &str = "/tmp/dplaned.pid";

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { pid: u32, uptime: Option<u64> },
    Stopped,
    Unhealthy { pid: u32, error: String },
}

/// Checks daemon liveness via the unauthenticated `/health` endpoint
/// (primary) and the PID file (secondary, used only to report a PID).
pub async fn check_daemon_running(listen_addr: &str) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder().timeout(Duration::from_millis(500)).build()?;
    let health_url = format!("http://{listen_addr}/health");

    let pid_file = get_pid_file_path();
    let local_pid = std::fs::read_to_string(&pid_file).ok().and_then(|s| s.trim().parse::<u32>().ok());

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let uptime = resp.json::<serde_json::Value>().await.ok().and_then(|v| v["uptime_seconds"].as_u64());
            Ok(DaemonStatus::Running { pid: local_pid.unwrap_or(0), uptime })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy { pid: local_pid.unwrap_or(0), error: format!("HTTP {}", resp.status()) }),
        Err(e) => {
            if let Some(pid) = local_pid {
                if process_exists(pid) {
                    return Ok(DaemonStatus::Unhealthy { pid, error: e.to_string() });
                }
                let _ = std::fs::remove_file(&pid_file);
            }
            Ok(DaemonStatus::Stopped)
        }
    }
}

/// Stop the daemon gracefully, sending SIGTERM and waiting up to
/// `timeout_secs` before escalating to SIGKILL if `force` is set.
pub async fn stop_daemon(_force: bool, _timeout_secs: u64) -> Result<()> {
    let pid_file = get_pid_file_path();

    let pid = std::fs::read_to_string(&pid_file).context("failed to read PID file")?.trim().parse::<u32>().context("invalid PID in PID file")?;

    info!("sending SIGTERM to process {pid}");

    #[cfg(unix)]
    {
        send_signal(pid, libc::SIGTERM)?;

        for _ in 0.._timeout_secs {
            if !process_exists(pid) {
                info!("daemon stopped gracefully");
                let _ = std::fs::remove_file(&pid_file);
                return Ok(());
            }
            sleep(Duration::from_secs(1)).await;
        }

        if _force {
            warn!("graceful shutdown timed out, sending SIGKILL");
            send_signal(pid, libc::SIGKILL)?;
            sleep(Duration::from_secs(1)).await;
        } else {
            anyhow::bail!("daemon did not stop within timeout");
        }
    }

    let _ = std::fs::remove_file(&pid_file);
    Ok(())
}

fn get_pid_file_path() -> PathBuf {
    #[cfg(unix)]
    {
        let uid = unsafe { libc::geteuid() };
        if uid == 0 {
            PathBuf::from(PID_FILE)
        } else {
            PathBuf::from(PID_FILE_FALLBACK)
        }
    }

    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("dplaned.pid")
    }
}

fn process_exists(_pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(_pid as i32, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    unsafe {
        if libc::kill(pid as i32, signal) != 0 {
            anyhow::bail!("failed to send signal {signal} to process {pid}");
        }
    }
    Ok(())
}

/// Write the PID file read by `check_daemon_running`/`stop_daemon`.
pub fn write_pid_file(pid: u32) -> Result<()> {
    let pid_file = get_pid_file_path();
    if let Some(parent) = pid_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    std::fs::write(&pid_file, pid.to_string()).with_context(|| format!("failed to write PID file: {pid_file:?}"))?;
    info!("wrote PID file: {pid_file:?}");
    Ok(())
}

/// Remove the PID file on clean shutdown.
pub fn remove_pid_file() -> Result<()> {
    let pid_file = get_pid_file_path();
    if pid_file.exists() {
        std::fs::remove_file(&pid_file).with_context(|| format!("failed to remove PID file: {pid_file:?}"))?;
        info!("removed PID file: {pid_file:?}");
    }
    Ok(())
}
