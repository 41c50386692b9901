// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # dplaned — D-PlaneOS control plane daemon and CLI
//!
//! `dplaned --daemon` runs the HTTP/WebSocket control plane described in
//! spec.md. Without `--daemon`, `dplaned` is a thin administrative CLI
//! that talks to a running daemon over loopback HTTP (audit chain
//! verification, GitOps state plan/apply/approve, daemon lifecycle).
//!
//! Exit codes (spec §6): 0 normal, 64 configuration error, 70 internal
//! error, 73 I/O error.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::error;

mod commands;
mod daemon;

use commands::{AuditCommand, ConfigCommand, DaemonCommand, StateCommand};

/// D-PlaneOS control plane daemon and administrative CLI.
#[derive(Parser)]
#[command(name = "dplaned")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as the control plane daemon (HTTP + background supervisors).
    #[arg(long, global = true)]
    daemon: bool,

    /// Path to the node configuration TOML file (overrides discovery).
    #[arg(short, long, global = true, env = "DPLANE_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the SQLite database file (overrides the config file).
    #[arg(long, global = true, env = "DPLANE_DB_PATH", value_name = "FILE")]
    db: Option<PathBuf>,

    /// Directory to write GitOps state snapshots for rollback.
    #[arg(long, global = true, env = "DPLANE_BACKUP_PATH", value_name = "DIR")]
    backup_path: Option<PathBuf>,

    /// Listen address for the HTTP/WebSocket API (overrides the config file).
    #[arg(long, global = true, env = "DPLANE_LISTEN_ADDR", value_name = "ADDR")]
    listen: Option<String>,

    /// Path to the desired-state document consulted by `state` subcommands.
    #[arg(long, global = true, env = "DPLANE_STATE_PATH", value_name = "FILE")]
    state: Option<PathBuf>,

    /// Administrative session token for CLI-to-daemon calls.
    #[arg(long, global = true, env = "DPLANE_TOKEN", value_name = "TOKEN")]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "DPLANE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the daemon process lifecycle.
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Inspect and verify the tamper-evident audit chain.
    #[command(name = "audit")]
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },

    /// GitOps desired-state inspection, planning and application.
    #[command(name = "state")]
    State {
        #[command(subcommand)]
        command: StateCommand,
    },

    /// Node configuration management.
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("{} {err:#}", "failed to initialize logging:".red());
        std::process::exit(64);
    }

    let result = run(cli).await;
    if let Err(err) = result {
        error!(error = %err, "dplaned exited with an error");
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.daemon {
        return daemon::server::start_daemon(daemon::server::DaemonStartArgs {
            config_path: cli.config,
            db_path: cli.db,
            backup_path: cli.backup_path,
            listen_addr: cli.listen,
        })
        .await;
    }

    match cli.command {
        Some(Commands::Daemon { command }) => commands::daemon::handle_command(command, cli.config).await,
        Some(Commands::Audit { command }) => commands::audit::handle_command(command, cli.listen, cli.token).await,
        Some(Commands::State { command }) => commands::state::handle_command(command, cli.listen, cli.token, cli.state).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(64);
        }
    }
}

/// Maps a failure to a sysexits-style code. Configuration and I/O
/// failures are distinguished from internal (unexpected) failures so
/// scripts invoking `dplaned` can tell a bad flag from a daemon bug.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(config_err) = err.downcast_ref::<dplane_core::config::ConfigError>() {
        return match config_err {
            dplane_core::config::ConfigError::Read { .. } => 73,
            dplane_core::config::ConfigError::Parse { .. } => 64,
            dplane_core::config::ConfigError::Invalid(_) => 64,
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return 73;
    }
    if let Some(dplane_err) = err.downcast_ref::<dplane_core::DplaneError>() {
        return match dplane_err {
            dplane_core::DplaneError::InputInvalid { .. } => 64,
            _ => 70,
        };
    }
    70
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| tracing_subscriber::EnvFilter::try_new(level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
