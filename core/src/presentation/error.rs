// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `DplaneError` -> `{ok:false,error,code}` with the status mapping
//! from spec §6/§7. No error detail beyond `DplaneError::Display` ever
//! crosses this boundary; internal errors carry only a correlation id.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::domain::DplaneError;

pub struct ApiError(pub DplaneError);

impl From<DplaneError> for ApiError {
    fn from(e: DplaneError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({"ok": false, "error": self.0.to_string(), "code": self.0.code()});
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Bearer token lifted from `Authorization: Bearer <token>` or a
/// `session=<token>` cookie; no session cookie crate is pulled in for
/// a single key=value pair (spec §6).
pub fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Ok(token.to_string());
            }
        }
    }
    if let Some(value) = headers.get(axum::http::header::COOKIE) {
        if let Ok(text) = value.to_str() {
            for part in text.split(';') {
                let part = part.trim();
                if let Some(token) = part.strip_prefix("session=") {
                    return Ok(token.to_string());
                }
            }
        }
    }
    Err(ApiError(DplaneError::AuthFailure))
}
