// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Audit chain inspection commands, delegating to a running daemon over
//! loopback HTTP (spec §6's `/system/audit/*` routes).

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Deserialize;

use crate::daemon::client::DaemonClient;

#[derive(Subcommand)]
pub enum AuditCommand {
    /// Walk the HMAC-chained audit log and report the first broken link, if any.
    Verify,

    /// List recent audit entries.
    List {
        /// Sequence number to resume from.
        #[arg(long, default_value_t = 0)]
        cursor: u64,

        /// Maximum number of entries to fetch.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Deserialize)]
struct VerifyChainResponse {
    ok: bool,
    first_bad_id: Option<u64>,
}

#[derive(Deserialize)]
struct ListEntriesResponse {
    entries: Vec<serde_json::Value>,
    next_cursor: Option<u64>,
}

pub async fn handle_command(command: AuditCommand, listen: Option<String>, token: Option<String>) -> Result<()> {
    let client = DaemonClient::new(listen, token)?;
    match command {
        AuditCommand::Verify => verify(&client).await,
        AuditCommand::List { cursor, limit } => list(&client, cursor, limit).await,
    }
}

async fn verify(client: &DaemonClient) -> Result<()> {
    let response: VerifyChainResponse = client.get_json("/system/audit/verify-chain").await.context("failed to verify audit chain")?;
    if response.ok {
        println!("{}", "audit chain intact".green());
        Ok(())
    } else {
        bail!("audit chain broken at entry {}", response.first_bad_id.map(|id| id.to_string()).unwrap_or_else(|| "unknown".to_string()))
    }
}

async fn list(client: &DaemonClient, cursor: u64, limit: u32) -> Result<()> {
    let path = format!("/system/audit/entries?cursor={cursor}&limit={limit}");
    let response: ListEntriesResponse = client.get_json(&path).await.context("failed to list audit entries")?;
    for entry in &response.entries {
        println!("{}", serde_json::to_string(entry).unwrap_or_default());
    }
    if let Some(next) = response.next_cursor {
        println!("{} --cursor {next}", "next page:".dimmed());
    }
    Ok(())
}
