// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Unix service installation (systemd/launchd).

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

#[cfg(target_os = "linux")]
const SERVICE_TEMPLATE: &str = include_str!("../../templates/dplaned.service");

#[cfg(target_os = "macos")]
const PLIST_TEMPLATE: &str = include_str!("../../templates/io.d-planeos.daemon.plist");

pub async fn install_service(binary_path: Option<PathBuf>, user: Option<String>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        install_systemd(binary_path, user).await
    }

    #[cfg(target_os = "macos")]
    {
        install_launchd(binary_path, user).await
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        anyhow::bail!("service installation is only supported on Linux and macOS")
    }
}

pub async fn uninstall_service() -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        uninstall_systemd().await
    }

    #[cfg(target_os = "macos")]
    {
        uninstall_launchd().await
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        anyhow::bail!("service uninstallation is only supported on Linux and macOS")
    }
}

#[cfg(target_os = "linux")]
async fn install_systemd(binary_path: Option<PathBuf>, user: Option<String>) -> Result<()> {
    use std::fs;

    info!("installing systemd service");

    let binary = binary_path.map(Ok).unwrap_or_else(std::env::current_exe).context("failed to resolve daemon binary path")?;
    if !binary.exists() {
        anyhow::bail!("binary not found: {binary:?}");
    }

    let service_content = SERVICE_TEMPLATE.replace("{{BINARY_PATH}}", &binary.display().to_string()).replace("{{USER}}", &user.unwrap_or_else(|| "root".to_string()));

    let service_path = "/etc/systemd/system/dplaned.service";
    fs::write(service_path, service_content).with_context(|| format!("failed to write service file: {service_path}"))?;
    println!("{}", format!("service file created: {service_path}").green());

    let output = std::process::Command::new("systemctl").arg("daemon-reload").output().context("failed to reload systemd")?;
    if !output.status.success() {
        anyhow::bail!("failed to reload systemd: {}", String::from_utf8_lossy(&output.stderr));
    }
    println!("{}", "systemd reloaded".green());

    println!();
    println!("{}", "service installed".bold().green());
    println!("  enable on boot: sudo systemctl enable dplaned");
    println!("  start now:      sudo systemctl start dplaned");
    println!("  check status:   sudo systemctl status dplaned");

    Ok(())
}

#[cfg(target_os = "linux")]
async fn uninstall_systemd() -> Result<()> {
    use std::fs;

    info!("uninstalling systemd service");

    let service_path = "/etc/systemd/system/dplaned.service";
    let _ = std::process::Command::new("systemctl").arg("stop").arg("dplaned").output();
    let _ = std::process::Command::new("systemctl").arg("disable").arg("dplaned").output();

    if std::path::Path::new(service_path).exists() {
        fs::remove_file(service_path).with_context(|| format!("failed to remove service file: {service_path}"))?;
        println!("{}", format!("service file removed: {service_path}").green());
    }

    let _ = std::process::Command::new("systemctl").arg("daemon-reload").output();
    println!("{}", "service uninstalled".green());
    Ok(())
}

#[cfg(target_os = "macos")]
async fn install_launchd(binary_path: Option<PathBuf>, _user: Option<String>) -> Result<()> {
    use std::fs;

    info!("installing LaunchDaemon");

    let binary = binary_path.map(Ok).unwrap_or_else(std::env::current_exe).context("failed to resolve daemon binary path")?;
    if !binary.exists() {
        anyhow::bail!("binary not found: {binary:?}");
    }

    let plist_content = PLIST_TEMPLATE.replace("{{BINARY_PATH}}", &binary.display().to_string());
    let plist_path = "/Library/LaunchDaemons/io.d-planeos.daemon.plist";
    fs::write(plist_path, plist_content).with_context(|| format!("failed to write plist file: {plist_path}"))?;
    println!("{}", format!("LaunchDaemon plist created: {plist_path}").green());

    let output = std::process::Command::new("launchctl").arg("load").arg(plist_path).output().context("failed to load LaunchDaemon")?;
    if !output.status.success() {
        anyhow::bail!("failed to load LaunchDaemon: {}", String::from_utf8_lossy(&output.stderr));
    }
    println!("{}", "LaunchDaemon loaded".green());

    println!();
    println!("{}", "service installed".bold().green());
    println!("the daemon starts automatically on boot");
    println!("  start now:    sudo launchctl start io.d-planeos.daemon");
    println!("  check status: sudo launchctl list | grep d-planeos");

    Ok(())
}

#[cfg(target_os = "macos")]
async fn uninstall_launchd() -> Result<()> {
    use std::fs;

    info!("uninstalling LaunchDaemon");

    let plist_path = "/Library/LaunchDaemons/io.d-planeos.daemon.plist";
    let _ = std::process::Command::new("launchctl").arg("unload").arg(plist_path).output();

    if std::path::Path::new(plist_path).exists() {
        fs::remove_file(plist_path).with_context(|| format!("failed to remove plist file: {plist_path}"))?;
        println!("{}", format!("LaunchDaemon plist removed: {plist_path}").green());
    }

    println!("{}", "service uninstalled".green());
    Ok(())
}
