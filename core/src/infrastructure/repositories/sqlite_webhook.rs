// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::repository::{RepositoryError, WebhookConfig, WebhookRepository};

pub struct SqliteWebhookRepository {
    pool: SqlitePool,
}

impl SqliteWebhookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn list(&self) -> Result<Vec<WebhookConfig>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM webhooks ORDER BY rowid").fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                Ok(WebhookConfig {
                    id: Uuid::parse_str(&id).map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
                    kind: row.try_get("kind")?,
                    url: row.try_get("url")?,
                    secret: row.try_get("secret")?,
                    enabled: row.try_get::<i64, _>("enabled")? != 0,
                })
            })
            .collect()
    }

    async fn upsert(&self, webhook: &WebhookConfig) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO webhooks (id, kind, url, secret, enabled) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, url = excluded.url,
                 secret = excluded.secret, enabled = excluded.enabled",
        )
        .bind(webhook.id.to_string())
        .bind(&webhook.kind)
        .bind(&webhook.url)
        .bind(&webhook.secret)
        .bind(webhook.enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM webhooks WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;
        Ok(())
    }
}
