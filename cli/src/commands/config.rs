// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration inspection commands: show, validate.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dplane_core::NodeConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the configuration that would be loaded, and where from.
    Show {
        /// Also print the discovery order that was checked.
        #[arg(long)]
        paths: bool,
    },

    /// Load and validate a configuration file without starting the daemon.
    Validate {
        /// Path to config file (default: discover).
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfig::load_or_default(config_override.clone())?;

    if show_paths {
        println!("{}", "Configuration discovery order:".bold());
        println!("  1. --config flag: {}", config_override.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "(not set)".dimmed().to_string()));
        println!(
            "  2. DPLANE_CONFIG_PATH: {}",
            std::env::var("DPLANE_CONFIG_PATH").unwrap_or_else(|_| "(not set)".to_string())
        );
        println!("  3. ./dplane.toml");
        println!("  4. /etc/dplane/dplane.toml");
        println!("  5. built-in defaults");
        println!();
    }

    println!("{}", "Node configuration:".bold());
    println!("  listen_addr: {}", config.listen_addr);
    println!("  db_path: {}", config.db_path.display());
    println!("  hmac_key_path: {}", config.hmac_key_path.display());
    println!("  backup_path: {}", config.backup_path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "(disabled)".dimmed().to_string()));
    println!("  networkd_prefix: {}", config.networkd_prefix);
    println!();
    println!("{}", "Capacity thresholds:".bold());
    println!("  warn: {:.0}%  critical: {:.0}%  emergency: {:.0}%", config.capacity.warn_fraction * 100.0, config.capacity.critical_fraction * 100.0, config.capacity.emergency_fraction * 100.0);
    println!("  hysteresis: {}%  cooldown: {}s", config.capacity.hysteresis_fraction * 100.0, config.capacity.cooldown_seconds);
    println!();
    println!("{}", "Rate limiting:".bold());
    println!("  {} req/min per session", config.rate_limit.requests_per_minute);
    println!();
    println!("{}", "Alerts:".bold());
    println!("  hysteresis: {}s  cooldown: {}s", config.alerts.hysteresis_seconds, config.alerts.cooldown_seconds);
    println!("  smtp_relay: {}", config.alerts.smtp_relay.as_deref().unwrap_or("(none)"));

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");
    let config = NodeConfig::load_or_default(config_path)?;
    config.validate()?;
    println!("{}", "valid configuration".green());
    Ok(())
}
