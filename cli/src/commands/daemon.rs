// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon lifecycle management commands: start, stop, status, install,
//! uninstall.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dplane_core::NodeConfig;
use tracing::info;

use crate::daemon::{check_daemon_running, stop_daemon, DaemonStatus};

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon as a detached background process.
    Start,

    /// Stop the daemon gracefully.
    Stop {
        /// Force kill if the daemon doesn't stop gracefully.
        #[arg(short, long)]
        force: bool,

        /// Timeout in seconds to wait for graceful shutdown.
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Check whether the daemon is running and healthy.
    Status,

    /// Install the daemon as a system service (systemd on Linux, launchd on macOS).
    #[cfg(unix)]
    Install {
        /// Binary path (default: current executable).
        #[arg(long)]
        binary_path: Option<PathBuf>,

        /// User to run the service as.
        #[arg(long)]
        user: Option<String>,
    },

    /// Remove the installed system service.
    #[cfg(unix)]
    Uninstall,
}

pub async fn handle_command(command: DaemonCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        DaemonCommand::Start => start(config_path).await,
        DaemonCommand::Stop { force, timeout } => stop(force, timeout).await,
        DaemonCommand::Status => status(config_path).await,
        #[cfg(unix)]
        DaemonCommand::Install { binary_path, user } => crate::daemon::install::install_service(binary_path, user).await,
        #[cfg(unix)]
        DaemonCommand::Uninstall => crate::daemon::install::uninstall_service().await,
    }
}

async fn start(config_path: Option<PathBuf>) -> Result<()> {
    let config = NodeConfig::load_or_default(config_path.clone()).context("failed to load configuration")?;
    config.validate().context("configuration validation failed")?;

    if let DaemonStatus::Running { pid, .. } = check_daemon_running(&config.listen_addr).await? {
        println!("{}", format!("daemon already running (pid {pid})").yellow());
        return Ok(());
    }

    info!("spawning daemon as a detached background process");
    let exe = std::env::current_exe().context("failed to resolve current executable path")?;
    let mut command = std::process::Command::new(exe);
    command.arg("--daemon");
    if let Some(path) = &config_path {
        command.arg("--config").arg(path);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().context("failed to spawn daemon process")?;
    println!("{}", format!("daemon started (pid {})", child.id()).green());
    Ok(())
}

async fn stop(force: bool, timeout_secs: u64) -> Result<()> {
    stop_daemon(force, timeout_secs).await?;
    println!("{}", "daemon stopped".green());
    Ok(())
}

async fn status(config_path: Option<PathBuf>) -> Result<()> {
    let config = NodeConfig::load_or_default(config_path).context("failed to load configuration")?;
    match check_daemon_running(&config.listen_addr).await? {
        DaemonStatus::Running { pid, .. } => {
            println!("{}", format!("running (pid {pid})").green());
            Ok(())
        }
        DaemonStatus::Unhealthy { pid, error } => {
            println!("{}", format!("unhealthy (pid {pid}): {error}").yellow());
            bail!("daemon is unhealthy")
        }
        DaemonStatus::Stopped => {
            println!("{}", "stopped".dimmed());
            Ok(())
        }
    }
}
