// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::repository::{RepositoryError, SnapshotSchedule, SnapshotScheduleRepository};

pub struct SqliteSnapshotScheduleRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotScheduleRepository for SqliteSnapshotScheduleRepository {
    async fn list(&self) -> Result<Vec<SnapshotSchedule>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM snapshot_schedules ORDER BY rowid").fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                Ok(SnapshotSchedule {
                    id: Uuid::parse_str(&id).map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
                    dataset: row.try_get("dataset")?,
                    cron_expression: row.try_get("cron_expression")?,
                    retention_count: row.try_get::<i64, _>("retention_count")? as u32,
                    enabled: row.try_get::<i64, _>("enabled")? != 0,
                })
            })
            .collect()
    }

    async fn upsert(&self, schedule: &SnapshotSchedule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO snapshot_schedules (id, dataset, cron_expression, retention_count, enabled)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET dataset = excluded.dataset, cron_expression = excluded.cron_expression,
                 retention_count = excluded.retention_count, enabled = excluded.enabled",
        )
        .bind(schedule.id.to_string())
        .bind(&schedule.dataset)
        .bind(&schedule.cron_expression)
        .bind(schedule.retention_count)
        .bind(schedule.enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM snapshot_schedules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
