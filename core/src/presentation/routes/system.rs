// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `/system/*` — audit chain verification and cursor-paginated entry
//! listing (spec §4.2, §6).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::domain::audit::AuditKind;
use crate::domain::identity::Permission;
use crate::domain::DplaneError;
use crate::presentation::error::{bearer_token, ApiResult};
use crate::presentation::state::AppState;

pub async fn verify_chain(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::SystemRead).await?;

    let first_bad_id = state.audit.verify_chain().await.map_err(DplaneError::from)?;
    if let Some(seq) = first_bad_id {
        state
            .audit
            .record_sync(AuditKind::ChainVerificationFailed, &auth.user_id.to_string(), "audit.verify_chain", &seq.to_string(), serde_json::json!({}))
            .await
            .map_err(|e| DplaneError::internal(e))?;
    }

    Ok(Json(serde_json::json!({"ok": first_bad_id.is_none(), "first_bad_id": first_bad_id})))
}

#[derive(Deserialize)]
pub struct EntriesQuery {
    /// Sequence id to resume from; defaults to the start of the chain.
    #[serde(default)]
    pub cursor: u64,
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

fn default_page_size() -> u32 {
    100
}

pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<EntriesQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::SystemRead).await?;

    let limit = q.limit.clamp(1, 1000) as u64;
    let to_seq = q.cursor.saturating_add(limit.saturating_sub(1));
    let entries = state.audit_repo.range(q.cursor, to_seq).await.map_err(DplaneError::from)?;
    let next_cursor = entries.last().map(|e| e.seq + 1);

    Ok(Json(serde_json::json!({"ok": true, "entries": entries, "next_cursor": next_cursor})))
}
