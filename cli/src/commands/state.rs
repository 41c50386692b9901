// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! GitOps desired-state inspection and reconciliation commands,
//! delegating to a running daemon over loopback HTTP (spec §6's
//! `/gitops/*` routes).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::daemon::client::DaemonClient;

#[derive(Subcommand)]
pub enum StateCommand {
    /// Show the currently stored desired state.
    Show,

    /// Upload a new desired-state document and store it.
    Put {
        /// Path to the desired-state YAML/JSON document. Defaults to `--state`.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Diff the desired state against freshly observed pool/dataset/share state.
    Plan,

    /// Apply the current plan. Items requiring approval are skipped unless approved first.
    Apply {
        /// Content hash of the plan being applied (guards against a stale plan).
        #[arg(long)]
        content_hash: String,
    },

    /// Approve one or more plan items by their approval key.
    Approve {
        /// Content hash of the plan the approval applies to.
        #[arg(long)]
        content_hash: String,

        /// Approval keys to grant, e.g. `pool/tank/destroy`.
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Serialize)]
struct ApplyRequest<'a> {
    content_hash: &'a str,
}

#[derive(Serialize)]
struct ApproveRequest<'a> {
    content_hash: &'a str,
    keys: &'a [String],
}

#[derive(Deserialize)]
struct PlanResponse {
    content_hash: String,
    plan: Vec<Value>,
}

/// `state_path` is the `--state` global flag's value; `state put` without
/// an explicit file falls back to it, since `--state` names the desired-
/// state document the daemon itself loads at boot (spec §6's daemon CLI
/// surface) and it is the natural default source for `state put` too.
pub async fn handle_command(command: StateCommand, listen: Option<String>, token: Option<String>, state_path: Option<PathBuf>) -> Result<()> {
    let client = DaemonClient::new(listen, token)?;
    match command {
        StateCommand::Show => show(&client).await,
        StateCommand::Put { file } => {
            let path = file.or(state_path).context("no desired-state file given (pass a path or set --state)")?;
            put(&client, path).await
        }
        StateCommand::Plan => plan(&client).await,
        StateCommand::Apply { content_hash } => apply(&client, &content_hash).await,
        StateCommand::Approve { content_hash, keys } => approve(&client, &content_hash, keys).await,
    }
}

async fn show(client: &DaemonClient) -> Result<()> {
    let body: Value = client.get_json("/gitops/state").await.context("failed to fetch desired state")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn put(client: &DaemonClient, file: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let document: Value = if file.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    client.put_json::<Value, _>("/gitops/state", &document).await.context("failed to store desired state")?;
    println!("{}", "desired state stored".green());
    Ok(())
}

async fn plan(client: &DaemonClient) -> Result<()> {
    let plan: PlanResponse = client.get_json("/gitops/plan").await.context("failed to compute plan")?;
    println!("{} {}", "content hash:".bold(), plan.content_hash);
    if plan.plan.is_empty() {
        println!("{}", "no changes".green());
        return Ok(());
    }
    for item in &plan.plan {
        println!("{}", serde_json::to_string(item).unwrap_or_default());
    }
    Ok(())
}

async fn apply(client: &DaemonClient, content_hash: &str) -> Result<()> {
    let body: Value = client.post_json("/gitops/apply", &ApplyRequest { content_hash }).await.context("failed to apply plan")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn approve(client: &DaemonClient, content_hash: &str, keys: Vec<String>) -> Result<()> {
    client.post_json::<Value, _>("/gitops/approve", &ApproveRequest { content_hash, keys: &keys }).await.context("failed to record approval")?;
    println!("{} {} key(s) approved", "ok:".green(), keys.len());
    Ok(())
}
