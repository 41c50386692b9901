// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Repository traits — one per aggregate, all returning `RepositoryError`.
//! Concrete implementations live in `infrastructure::repositories` and are
//! backed by a single SQLite database (spec §3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::audit::AuditEntry;
use super::identity::{Role, User, UserRoleGrant};
use super::session::Session;
use super::state::DesiredState;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<User, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<User, RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    async fn create(&self, user: &User) -> Result<User, RepositoryError>;
    async fn update(&self, user: &User) -> Result<(), RepositoryError>;
    /// Fails with `Conflict` if `id == GOD_USER_ID` — the god user is
    /// immortal (spec §3).
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find(&self, name: &str) -> Result<Role, RepositoryError>;
    async fn list(&self) -> Result<Vec<Role>, RepositoryError>;
    async fn upsert_custom(&self, role: &Role) -> Result<(), RepositoryError>;
    async fn grants_for_user(&self, user_id: i64) -> Result<Vec<UserRoleGrant>, RepositoryError>;
    async fn grant(&self, grant: &UserRoleGrant) -> Result<(), RepositoryError>;
    async fn revoke(&self, user_id: i64, role_name: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_token_hash(&self, token_hash: &[u8]) -> Result<Session, RepositoryError>;
    async fn create(&self, session: &Session) -> Result<(), RepositoryError>;
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError>;
    async fn revoke(&self, id: Uuid) -> Result<(), RepositoryError>;
    async fn revoke_all_for_user(&self, user_id: i64) -> Result<(), RepositoryError>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;
    async fn last(&self) -> Result<Option<AuditEntry>, RepositoryError>;
    async fn range(
        &self,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<AuditEntry>, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait GitopsStateRepository: Send + Sync {
    async fn current(&self) -> Result<Option<DesiredState>, RepositoryError>;
    async fn store_pending(&self, state: &DesiredState) -> Result<(), RepositoryError>;
    async fn commit(&self, content_hash: &str) -> Result<(), RepositoryError>;
    async fn history(&self, limit: u32) -> Result<Vec<DesiredState>, RepositoryError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebhookConfig {
    pub id: Uuid,
    pub kind: String,
    pub url: String,
    pub secret: Option<String>,
    pub enabled: bool,
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<WebhookConfig>, RepositoryError>;
    async fn upsert(&self, webhook: &WebhookConfig) -> Result<(), RepositoryError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SnapshotSchedule {
    pub id: Uuid,
    pub dataset: String,
    pub cron_expression: String,
    pub retention_count: u32,
    pub enabled: bool,
}

#[async_trait]
pub trait SnapshotScheduleRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<SnapshotSchedule>, RepositoryError>;
    async fn upsert(&self, schedule: &SnapshotSchedule) -> Result<(), RepositoryError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}
