// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `/auth/*` — login, logout, change-password, TOTP verification
//! (spec §6, none/self permission).

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::domain::session::Session;
use crate::domain::totp;
use crate::domain::DplaneError;
use crate::presentation::error::{bearer_token, ApiError, ApiResult};
use crate::presentation::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginRequest>) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.auth.login(&body.username, &body.password).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "session_token": outcome.raw_token.0,
        "must_change_password": outcome.user.must_change_password,
    })))
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let token_hash = Session::hash_token(&token);
    let session = state.sessions.find_by_token_hash(&token_hash).await.map_err(|_| ApiError(DplaneError::AuthFailure))?;
    state.auth.logout(session.id, &session.user_id.to_string()).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authenticate(&token).await?;
    let outcome = state.auth.change_password(auth.user_id, &auth.user_id.to_string(), &body.new_password).await?;
    state.rbac.invalidate(auth.user_id);
    Ok(Json(serde_json::json!({"ok": true, "session_token": outcome.raw_token.0})))
}

#[derive(Deserialize)]
pub struct TotpVerifyRequest {
    pub code: String,
}

pub async fn totp_verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TotpVerifyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authenticate(&token).await?;
    let user = state.users.find_by_id(auth.user_id).await.map_err(|_| ApiError(DplaneError::AuthFailure))?;
    let Some(secret) = user.totp_secret else {
        return Err(ApiError(DplaneError::InputInvalid { reason: "totp not enrolled".into() }));
    };
    let now = chrono::Utc::now().timestamp() as u64;
    let ok = totp::verify(&secret, &body.code, now).map_err(|_| DplaneError::InputInvalid { reason: "totp-secret".into() })?;
    if !ok {
        return Err(ApiError(DplaneError::AuthFailure));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}
