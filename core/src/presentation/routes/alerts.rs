// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `/alerts/webhooks*` — sink CRUD and one-shot test dispatch
//! (spec §4.10, §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::audit::AuditKind;
use crate::domain::identity::Permission;
use crate::domain::repository::WebhookConfig;
use crate::domain::DplaneError;
use crate::presentation::error::{bearer_token, ApiError, ApiResult};
use crate::presentation::state::AppState;

pub async fn list_webhooks(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::AlertsManage).await?;
    let webhooks = state.webhooks.list().await.map_err(DplaneError::from)?;
    Ok(Json(serde_json::json!({"ok": true, "webhooks": webhooks})))
}

#[derive(Deserialize)]
pub struct UpsertWebhookRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub kind: String,
    pub url: String,
    pub secret: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn upsert_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpsertWebhookRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::AlertsManage).await?;

    let webhook = WebhookConfig {
        id: body.id.unwrap_or_else(Uuid::new_v4),
        kind: body.kind,
        url: body.url,
        secret: body.secret,
        enabled: body.enabled,
    };
    state.webhooks.upsert(&webhook).await.map_err(DplaneError::from)?;
    state
        .audit
        .record(AuditKind::StateApplied, &auth.user_id.to_string(), "alerts.webhook.upsert", &webhook.id.to_string(), serde_json::json!({"kind": webhook.kind}))
        .await;

    Ok(Json(serde_json::json!({"ok": true, "id": webhook.id})))
}

pub async fn delete_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::AlertsManage).await?;
    state.webhooks.delete(id).await.map_err(DplaneError::from)?;
    state
        .audit
        .record(AuditKind::StateApplied, &auth.user_id.to_string(), "alerts.webhook.delete", &id.to_string(), serde_json::json!({}))
        .await;
    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn test_webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::AlertsManage).await?;

    let webhooks = state.webhooks.list().await.map_err(DplaneError::from)?;
    let webhook = webhooks.into_iter().find(|w| w.id == id).ok_or_else(|| DplaneError::NotFound(id.to_string()))?;

    state
        .alerts
        .test_dispatch(&webhook)
        .await
        .map_err(|err| ApiError(DplaneError::ExternalFailure { tool: "alert-sink".into(), exit_code: -1, stderr_tail: err.to_string() }))?;

    Ok(Json(serde_json::json!({"ok": true})))
}
