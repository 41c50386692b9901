// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::audit::{AuditEntry, AuditKind};
use crate::domain::repository::{AuditRepository, RepositoryError};

pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, RepositoryError> {
        let id: String = row.try_get("id")?;
        let kind: String = row.try_get("kind")?;
        let detail: String = row.try_get("detail")?;
        let prev_hash: Vec<u8> = row.try_get("prev_hash")?;
        let hmac: Vec<u8> = row.try_get("hmac")?;
        Ok(AuditEntry {
            seq: row.try_get::<i64, _>("seq")? as u64,
            id: uuid::Uuid::parse_str(&id).map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
            timestamp: row.try_get("timestamp")?,
            kind: kind_from_str(&kind).ok_or_else(|| RepositoryError::Corrupt(format!("unknown audit kind {kind}")))?,
            actor: row.try_get("actor")?,
            action: row.try_get("action")?,
            target: row.try_get("target")?,
            detail: serde_json::from_str(&detail)?,
            prev_hash: to_array(&prev_hash)?,
            hmac: to_array(&hmac)?,
        })
    }
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32], RepositoryError> {
    bytes
        .try_into()
        .map_err(|_| RepositoryError::Corrupt(format!("expected 32 bytes, got {}", bytes.len())))
}

fn kind_from_str(s: &str) -> Option<AuditKind> {
    use AuditKind::*;
    Some(match s {
        "auth_success" => AuthSuccess,
        "auth_failure" => AuthFailure,
        "command_executed" => CommandExecuted,
        "command_blocked" => CommandBlocked,
        "state_applied" => StateApplied,
        "state_rejected" => StateRejected,
        "role_granted" => RoleGranted,
        "role_revoked" => RoleRevoked,
        "alert_fired" => AlertFired,
        "alert_resolved" => AlertResolved,
        "chain_verification_failed" => ChainVerificationFailed,
        _ => return None,
    })
}

fn kind_to_str(kind: &AuditKind) -> &'static str {
    use AuditKind::*;
    match kind {
        AuthSuccess => "auth_success",
        AuthFailure => "auth_failure",
        CommandExecuted => "command_executed",
        CommandBlocked => "command_blocked",
        StateApplied => "state_applied",
        StateRejected => "state_rejected",
        RoleGranted => "role_granted",
        RoleRevoked => "role_revoked",
        AlertFired => "alert_fired",
        AlertResolved => "alert_resolved",
        ChainVerificationFailed => "chain_verification_failed",
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO audit_entries (seq, id, timestamp, kind, actor, action, target, detail, prev_hash, hmac)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.seq as i64)
        .bind(entry.id.to_string())
        .bind(entry.timestamp)
        .bind(kind_to_str(&entry.kind))
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.target)
        .bind(entry.detail.to_string())
        .bind(entry.prev_hash.to_vec())
        .bind(entry.hmac.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last(&self) -> Result<Option<AuditEntry>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM audit_entries ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM audit_entries WHERE seq >= ? AND seq <= ? ORDER BY seq")
            .bind(from_seq as i64)
            .bind(to_seq as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM audit_entries").fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }
}
