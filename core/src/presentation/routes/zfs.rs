// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `/zfs/*` — imperative pool/dataset/health routes (spec §6). Pool
//! creation and destruction here bypass the GitOps plan/apply flow
//! entirely; they still go through the same Executor whitelist and
//! the same approval/audit invariants (spec §3) as a GitOps apply.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::domain::command::Hole;
use crate::domain::identity::Permission;
use crate::domain::audit::AuditKind;
use crate::domain::state::PoolTopology;
use crate::domain::DplaneError;
use crate::application::health::DeviceScorer;
use crate::infrastructure::zfs_cli::ZfsCli;
use crate::presentation::error::{bearer_token, ApiError, ApiResult};
use crate::presentation::state::AppState;

pub async fn list_pools(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::StorageRead).await?;
    let observed = ZfsCli::new(&state.executor).observe().await.map_err(|e| DplaneError::internal(e))?;
    Ok(Json(serde_json::json!({"ok": true, "pools": observed.pools})))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::StorageRead).await?;
    let observed = ZfsCli::new(&state.executor).observe().await.map_err(|e| DplaneError::internal(e))?;
    Ok(Json(serde_json::json!({"ok": true, "datasets": observed.datasets})))
}

/// Per-device SMART risk alongside pool health (spec §4.4's health
/// scorer feeds this endpoint as well as alert payloads).
pub async fn health(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::StorageRead).await?;
    let observed = ZfsCli::new(&state.executor).observe().await.map_err(|e| DplaneError::internal(e))?;
    let scorer = DeviceScorer::new(&state.executor);

    let mut devices = Vec::new();
    for pool in observed.pools.values() {
        for device in &pool.devices {
            match scorer.score(device).await {
                Ok((report, score)) => devices.push(serde_json::json!({
                    "device": device,
                    "pool": pool.name,
                    "risk": format!("{:?}", report.risk()),
                    "score": score,
                })),
                Err(err) => devices.push(serde_json::json!({
                    "device": device,
                    "pool": pool.name,
                    "error": err.to_string(),
                })),
            }
        }
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "pools": observed.pools,
        "devices": devices,
    })))
}

pub async fn capacity(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    state.rbac.authorize(&token, Permission::StorageRead).await?;
    let observed = ZfsCli::new(&state.executor).observe().await.map_err(|e| DplaneError::internal(e))?;
    let pools: Vec<_> = observed
        .pools
        .values()
        .map(|p| serde_json::json!({"pool": p.name, "used_fraction": p.used_fraction(), "size_bytes": p.size_bytes, "used_bytes": p.used_bytes}))
        .collect();
    Ok(Json(serde_json::json!({"ok": true, "pools": pools})))
}

#[derive(Deserialize)]
pub struct CreatePoolRequest {
    pub name: String,
    pub topology: PoolTopology,
    pub devices: Vec<String>,
}

fn topology_literal(topology: PoolTopology) -> Option<&'static str> {
    match topology {
        PoolTopology::Single | PoolTopology::Mirror => None,
        PoolTopology::Raidz1 => Some("raidz1"),
        PoolTopology::Raidz2 => Some("raidz2"),
        PoolTopology::Raidz3 => Some("raidz3"),
    }
}

pub async fn create_pool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePoolRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::StorageWrite).await?;

    Hole::PoolName.validate(&body.name).map_err(|_| DplaneError::InputInvalid { reason: "pool-name".into() })?;
    if body.devices.is_empty() {
        return Err(ApiError(DplaneError::InputInvalid { reason: "devices".into() }));
    }
    for device in &body.devices {
        Hole::DeviceById.validate(device).map_err(|_| DplaneError::InputInvalid { reason: "device-by-id".into() })?;
    }

    let mut argv: Vec<&str> = vec!["create", &body.name];
    if let Some(literal) = topology_literal(body.topology) {
        argv.push(literal);
    } else if body.topology == PoolTopology::Mirror {
        argv.push("mirror");
    }
    let device_refs: Vec<&str> = body.devices.iter().map(String::as_str).collect();
    argv.extend(device_refs);

    match state.executor.run("zpool", &argv).await {
        Ok(_) => {
            state
                .audit
                .record(AuditKind::CommandExecuted, &auth.user_id.to_string(), "zpool.create", &body.name, serde_json::json!({"topology": body.topology}))
                .await;
            state.events.publish(crate::domain::events::DomainEvent::ZfsPoolCreated { pool: body.name.clone() }, chrono::Utc::now());
            Ok(Json(serde_json::json!({"ok": true})))
        }
        Err(err) => Err(ApiError(DplaneError::ExternalFailure {
            tool: "zpool".into(),
            exit_code: -1,
            stderr_tail: err.to_string(),
        })),
    }
}

#[derive(Deserialize, Default)]
pub struct DestroyPoolRequest {
    #[serde(default)]
    pub approved: bool,
}

/// Pool destroy always requires explicit approval regardless of
/// content (spec §3 invariant); this imperative route is not a
/// GitOps apply so approval here is a same-request confirmation
/// flag rather than a separate `/gitops/approve` call.
pub async fn destroy_pool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    body: Option<Json<DestroyPoolRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::StorageDelete).await?;

    Hole::PoolName.validate(&name).map_err(|_| DplaneError::InputInvalid { reason: "pool-name".into() })?;

    let approved = body.map(|Json(b)| b.approved).unwrap_or(false);
    if !approved {
        state
            .audit
            .record_sync(AuditKind::CommandBlocked, &auth.user_id.to_string(), "zpool.destroy", &name, serde_json::json!({"reason": "pool-destroy-always-requires-approval"}))
            .await
            .map_err(|e| DplaneError::internal(e))?;
        return Err(ApiError(DplaneError::Blocked { reason: "pool-destroy-always-requires-approval".into() }));
    }

    match state.executor.run("zpool", &["destroy", "-f", &name]).await {
        Ok(_) => {
            state
                .audit
                .record_sync(AuditKind::StateApplied, &auth.user_id.to_string(), "zpool.destroy", &name, serde_json::json!({"approved": true}))
                .await
                .map_err(|e| DplaneError::internal(e))?;
            Ok(Json(serde_json::json!({"ok": true})))
        }
        Err(err) => Err(ApiError(DplaneError::ExternalFailure {
            tool: "zpool".into(),
            exit_code: -1,
            stderr_tail: err.to_string(),
        })),
    }
}

/// Scrub is validated against the `PoolName` hole *before* the
/// Executor is ever touched (defence in depth, spec scenario 3): a
/// rejected invocation never reaches `Executor::run` and produces
/// exactly one audit entry — the rejection itself, not a scrub entry.
pub async fn scrub_pool(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(pool): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authorize(&token, Permission::StorageScrub).await?;

    if Hole::PoolName.validate(&pool).is_err() {
        state
            .audit
            .record_sync(AuditKind::CommandBlocked, &auth.user_id.to_string(), "zpool.scrub", &pool, serde_json::json!({"reason": "pool-name"}))
            .await
            .map_err(|e| DplaneError::internal(e))?;
        return Err(ApiError(DplaneError::InputInvalid { reason: "pool-name".into() }));
    }

    match state.executor.run("zpool", &["scrub", &pool]).await {
        Ok(_) => {
            state.audit.record(AuditKind::CommandExecuted, &auth.user_id.to_string(), "zpool.scrub", &pool, serde_json::json!({})).await;
            Ok(Json(serde_json::json!({"ok": true})))
        }
        Err(err) => Err(ApiError(DplaneError::ExternalFailure {
            tool: "zpool".into(),
            exit_code: -1,
            stderr_tail: err.to_string(),
        })),
    }
}
