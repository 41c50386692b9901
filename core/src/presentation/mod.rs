// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! HTTP surface assembly (spec §6): one `Router` under `/api`, shared
//! `AppState`, tracing + timeout + per-session rate limiting as the
//! only cross-cutting middleware.

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Unauthenticated liveness probe for process supervisors and the
/// CLI's `daemon status` check (spec §6 lists it as operational, not
/// part of the RBAC-gated surface).
async fn health(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"ok": true, "uptime_seconds": state.start_time.elapsed().as_secs()}))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route("/auth/totp/verify", post(routes::auth::totp_verify))
        .route("/zfs/pools", get(routes::zfs::list_pools).post(routes::zfs::create_pool))
        .route("/zfs/pools/{name}", delete(routes::zfs::destroy_pool))
        .route("/zfs/datasets", get(routes::zfs::list_datasets))
        .route("/zfs/health", get(routes::zfs::health))
        .route("/zfs/capacity", get(routes::zfs::capacity))
        .route("/zfs/scrub/{pool}", post(routes::zfs::scrub_pool))
        .route("/gitops/state", get(routes::gitops::get_state).put(routes::gitops::put_state))
        .route("/gitops/plan", get(routes::gitops::get_plan))
        .route("/gitops/apply", post(routes::gitops::apply_plan))
        .route("/gitops/approve", post(routes::gitops::approve_plan))
        .route("/system/audit/verify-chain", get(routes::system::verify_chain))
        .route("/system/audit/entries", get(routes::system::list_entries))
        .route("/alerts/webhooks", get(routes::alerts::list_webhooks).post(routes::alerts::upsert_webhook))
        .route("/alerts/webhooks/{id}", delete(routes::alerts::delete_webhook))
        .route("/alerts/webhooks/{id}/test", post(routes::alerts::test_webhook))
        .route("/ws/monitor", get(routes::ws::monitor))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
