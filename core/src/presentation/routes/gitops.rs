// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `/gitops/*` — declarative state document, plan, apply, approve
//! (spec §4.6, §4.7, §6).

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::application::applier::StateApplier;
use crate::application::differ::StateDiffer;
use crate::domain::audit::AuditKind;
use crate::domain::identity::Permission;
use crate::domain::state::DesiredState;
use crate::domain::DplaneError;
use crate::infrastructure::zfs_cli::ZfsCli;
use crate::presentation::error::{bearer_token, ApiResult};
use crate::presentation::state::AppState;

pub async fn get_state(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::GitopsRead).await?;
    let current = state.gitops.current().await.map_err(DplaneError::from)?;
    Ok(Json(serde_json::json!({"ok": true, "state": current})))
}

/// The DesiredState document has a single logical writer: this route,
/// under the repository's read-many/write-one discipline (spec §5).
pub async fn put_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(desired): Json<DesiredState>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::GitopsWrite).await?;

    if let Some(backup_dir) = &state.config.backup_path {
        if let Ok(Some(previous)) = state.gitops.current().await {
            backup_desired_state(backup_dir, &previous);
        }
    }

    let content_hash = desired.content_hash();
    state.gitops.store_pending(&desired).await.map_err(DplaneError::from)?;
    state.gitops.commit(&content_hash).await.map_err(DplaneError::from)?;

    state
        .audit
        .record(AuditKind::StateApplied, &auth.user_id.to_string(), "gitops.state.put", &content_hash, serde_json::json!({}))
        .await;

    Ok(Json(serde_json::json!({"ok": true, "content_hash": content_hash})))
}

pub async fn get_plan(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::GitopsRead).await?;

    let desired = state.gitops.current().await.map_err(DplaneError::from)?.unwrap_or_default();
    let observed = ZfsCli::new(&state.executor).observe().await.map_err(|e| DplaneError::internal(e))?;
    let plan = StateDiffer::diff(&desired, &observed);
    let content_hash = desired.content_hash();

    Ok(Json(serde_json::json!({"ok": true, "plan": plan, "content_hash": content_hash})))
}

/// Best-effort: a failed backup write is logged, not fatal — it must
/// never block a legitimate state push (spec §6's `--backup-path`).
fn backup_desired_state(backup_dir: &std::path::Path, previous: &DesiredState) {
    if let Err(err) = std::fs::create_dir_all(backup_dir) {
        tracing::warn!(error = %err, ?backup_dir, "failed to create gitops state backup directory");
        return;
    }
    let path = backup_dir.join(format!("{}.json", previous.content_hash()));
    match serde_json::to_vec_pretty(previous) {
        Ok(bytes) => {
            if let Err(err) = std::fs::write(&path, bytes) {
                tracing::warn!(error = %err, ?path, "failed to write gitops state backup");
            }
        }
        Err(err) => tracing::warn!(error = %err, "failed to serialize gitops state backup"),
    }
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    /// The content hash the caller's plan was computed against;
    /// mismatched against the live desired state yields `conflict`
    /// (spec §4.7's optimistic concurrency check).
    pub content_hash: String,
}

pub async fn apply_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ApplyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::GitopsWrite).await?;

    let desired = state.gitops.current().await.map_err(DplaneError::from)?.unwrap_or_default();
    let live_content_hash = desired.content_hash();
    let observed = ZfsCli::new(&state.executor).observe().await.map_err(|e| DplaneError::internal(e))?;
    let plan = StateDiffer::diff(&desired, &observed);
    let approved_keys = state.approvals.approved_for(&body.content_hash).await;

    let applier = StateApplier::new(&state.executor);
    let outcome = applier.apply(&plan, &desired, &approved_keys, &body.content_hash, &live_content_hash).await?;

    state
        .audit
        .record(AuditKind::StateApplied, &auth.user_id.to_string(), "gitops.plan.apply", &live_content_hash, serde_json::json!({"applied": outcome.applied.len(), "deferred": outcome.deferred.len()}))
        .await;
    state.events.publish(crate::domain::events::DomainEvent::GitopsPlanApplied { plan_hash: live_content_hash }, chrono::Utc::now());

    Ok(Json(serde_json::json!({"ok": true, "applied": outcome.applied, "deferred": outcome.deferred})))
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub content_hash: String,
    pub keys: Vec<String>,
}

pub async fn approve_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ApproveRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::GitopsApprove).await?;

    state.approvals.approve(&body.content_hash, body.keys.clone()).await;
    state
        .audit
        .record(AuditKind::StateApplied, &auth.user_id.to_string(), "gitops.plan.approve", &body.content_hash, serde_json::json!({"keys": body.keys}))
        .await;

    Ok(Json(serde_json::json!({"ok": true})))
}
