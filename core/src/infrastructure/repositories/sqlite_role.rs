// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::identity::{Permission, Role, UserRoleGrant};
use crate::domain::repository::{RepositoryError, RoleRepository};

pub struct SqliteRoleRepository {
    pool: SqlitePool,
}

impl SqliteRoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for SqliteRoleRepository {
    async fn find(&self, name: &str) -> Result<Role, RepositoryError> {
        if let Some(role) = Role::system_roles().into_iter().find(|r| r.name == name) {
            return Ok(role);
        }
        let row = sqlx::query("SELECT * FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("role '{name}'")))?;
        row_to_role(&row)
    }

    async fn list(&self) -> Result<Vec<Role>, RepositoryError> {
        let mut roles = Role::system_roles();
        let rows = sqlx::query("SELECT * FROM roles ORDER BY name").fetch_all(&self.pool).await?;
        for row in &rows {
            roles.push(row_to_role(row)?);
        }
        Ok(roles)
    }

    async fn upsert_custom(&self, role: &Role) -> Result<(), RepositoryError> {
        if role.is_system {
            return Err(RepositoryError::Conflict("system roles are immutable".into()));
        }
        let permissions: Vec<&'static str> = role.permissions.iter().map(Permission::as_str).collect();
        let permissions_json = serde_json::to_string(&permissions)?;
        sqlx::query(
            "INSERT INTO roles (name, display_name, permissions) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET display_name = excluded.display_name, permissions = excluded.permissions",
        )
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(permissions_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn grants_for_user(&self, user_id: i64) -> Result<Vec<UserRoleGrant>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM user_role_grants WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(UserRoleGrant {
                    user_id: row.try_get("user_id")?,
                    role_name: row.try_get("role_name")?,
                    expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
                })
            })
            .collect()
    }

    async fn grant(&self, grant: &UserRoleGrant) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_role_grants (user_id, role_name, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, role_name) DO UPDATE SET expires_at = excluded.expires_at",
        )
        .bind(grant.user_id)
        .bind(&grant.role_name)
        .bind(grant.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke(&self, user_id: i64, role_name: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_role_grants WHERE user_id = ? AND role_name = ?")
            .bind(user_id)
            .bind(role_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_role(row: &sqlx::sqlite::SqliteRow) -> Result<Role, RepositoryError> {
    let permissions_json: String = row.try_get("permissions")?;
    let names: Vec<String> = serde_json::from_str(&permissions_json)?;
    let permissions = names.iter().filter_map(|n| permission_from_str(n)).collect();
    Ok(Role {
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        is_system: false,
        permissions,
    })
}

fn permission_from_str(s: &str) -> Option<Permission> {
    use Permission::*;
    Some(match s {
        "storage:read" => StorageRead,
        "storage:write" => StorageWrite,
        "storage:delete" => StorageDelete,
        "storage:scrub" => StorageScrub,
        "docker:read" => DockerRead,
        "docker:exec" => DockerExec,
        "network:read" => NetworkRead,
        "network:write" => NetworkWrite,
        "shares:read" => SharesRead,
        "shares:write" => SharesWrite,
        "gitops:read" => GitopsRead,
        "gitops:write" => GitopsWrite,
        "gitops:approve" => GitopsApprove,
        "roles:assign" => RolesAssign,
        "system:read" => SystemRead,
        "alerts:manage" => AlertsManage,
        _ => return None,
    })
}
