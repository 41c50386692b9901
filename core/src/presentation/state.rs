// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Shared application state handed to every axum route (spec §6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::application::alerts::AlertPipeline;
use crate::application::auth_service::AuthService;
use crate::application::rbac::RbacGuard;
use crate::config::NodeConfig;
use crate::domain::repository::{AuditRepository, GitopsStateRepository, SessionRepository, UserRepository, WebhookRepository};
use crate::infrastructure::audit::AuditChain;
use crate::infrastructure::docker_client::DockerClient;
use crate::infrastructure::event_bus::EventHub;
use crate::infrastructure::executor::Executor;
use crate::presentation::rate_limit::SessionRateLimiter;

/// Approvals are scoped to a single plan-hash and never persist across
/// plan regenerations (spec §4.7).
#[derive(Default)]
pub struct ApprovalStore {
    by_plan_hash: Mutex<HashMap<String, HashSet<String>>>,
}

impl ApprovalStore {
    pub async fn approve(&self, plan_hash: &str, keys: Vec<String>) {
        let mut guard = self.by_plan_hash.lock().await;
        guard.entry(plan_hash.to_string()).or_default().extend(keys);
    }

    pub async fn approved_for(&self, plan_hash: &str) -> HashSet<String> {
        self.by_plan_hash.lock().await.get(plan_hash).cloned().unwrap_or_default()
    }
}

pub struct AppState {
    pub start_time: std::time::Instant,
    pub config: NodeConfig,
    pub executor: Arc<Executor>,
    pub docker: Arc<DockerClient>,
    pub events: Arc<EventHub>,
    pub audit: Arc<AuditChain>,
    pub rbac: Arc<RbacGuard>,
    pub auth: Arc<AuthService>,
    pub alerts: Arc<AlertPipeline>,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub audit_repo: Arc<dyn AuditRepository>,
    pub gitops: Arc<dyn GitopsStateRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub approvals: ApprovalStore,
    pub rate_limiter: SessionRateLimiter,
}
