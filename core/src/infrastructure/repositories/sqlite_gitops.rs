// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::repository::{GitopsStateRepository, RepositoryError};
use crate::domain::state::DesiredState;

pub struct SqliteGitopsStateRepository {
    pool: SqlitePool,
}

impl SqliteGitopsStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GitopsStateRepository for SqliteGitopsStateRepository {
    async fn current(&self) -> Result<Option<DesiredState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT document FROM gitops_state_history WHERE committed = 1 ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            let document: String = r.try_get("document")?;
            serde_json::from_str(&document).map_err(RepositoryError::from)
        })
        .transpose()
    }

    async fn store_pending(&self, state: &DesiredState) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(state)?;
        sqlx::query(
            "INSERT INTO gitops_state_history (content_hash, document, committed, created_at)
             VALUES (?, ?, 0, ?)
             ON CONFLICT(content_hash) DO UPDATE SET document = excluded.document",
        )
        .bind(state.content_hash())
        .bind(document)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn commit(&self, content_hash: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE gitops_state_history SET committed = 1 WHERE content_hash = ?")
            .bind(content_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("pending state {content_hash}")));
        }
        Ok(())
    }

    async fn history(&self, limit: u32) -> Result<Vec<DesiredState>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document FROM gitops_state_history WHERE committed = 1 ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                let document: String = r.try_get("document")?;
                serde_json::from_str(&document).map_err(RepositoryError::from)
            })
            .collect()
    }
}
