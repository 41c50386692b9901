// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Per-session rate limiting: default 100 req/min per session, over
//! the limit maps to 429 (spec §6).

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{Quota, RateLimiter};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::clock::DefaultClock;

use crate::config::RateLimitConfig;
use crate::presentation::error::bearer_token;
use crate::presentation::state::AppState;

pub struct SessionRateLimiter {
    limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
}

impl SessionRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute.max(1)).expect("max(1) is never zero");
        let quota = Quota::per_minute(per_minute);
        Self { limiter: RateLimiter::keyed(quota) }
    }

    fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }
}

/// Keys on the bearer token (i.e. the session) when present, otherwise
/// falls back to a shared anonymous bucket — unauthenticated routes
/// like `/auth/login` still get throttled, just not per-identity.
pub async fn enforce(State(state): State<Arc<AppState>>, request: Request<axum::body::Body>, next: Next) -> Response {
    let key = bearer_token(request.headers()).unwrap_or_else(|_| "anonymous".to_string());
    if !state.rate_limiter.check(&key) {
        return (StatusCode::TOO_MANY_REQUESTS, axum::Json(serde_json::json!({"ok": false, "error": "rate limit exceeded", "code": "rate_limited"}))).into_response();
    }
    next.run(request).await
}
