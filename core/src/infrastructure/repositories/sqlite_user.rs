// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::identity::{User, UserSource, GOD_USER_ID};
use crate::domain::repository::{RepositoryError, UserRepository};

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
        let source: String = row.try_get("source")?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            must_change_password: row.try_get::<i64, _>("must_change_password")? != 0,
            totp_secret: row.try_get("totp_secret")?,
            disabled: row.try_get::<i64, _>("disabled")? != 0,
            source: match source.as_str() {
                "directory" => UserSource::Directory,
                _ => UserSource::Local,
            },
        })
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<User, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;
        Self::from_row(&row)
    }

    async fn find_by_username(&self, username: &str) -> Result<User, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("user '{username}'")))?;
        Self::from_row(&row)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id").fetch_all(&self.pool).await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn create(&self, user: &User) -> Result<User, RepositoryError> {
        let source = match user.effective_source() {
            UserSource::Local => "local",
            UserSource::Directory => "directory",
        };
        let id = sqlx::query(
            "INSERT INTO users (username, password_hash, must_change_password, totp_secret, disabled, source)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.must_change_password)
        .bind(&user.totp_secret)
        .bind(user.disabled)
        .bind(source)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        self.find_by_id(id).await
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let source = match user.effective_source() {
            UserSource::Local => "local",
            UserSource::Directory => "directory",
        };
        sqlx::query(
            "UPDATE users SET username = ?, password_hash = ?, must_change_password = ?,
                 totp_secret = ?, disabled = ?, source = ? WHERE id = ?",
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.must_change_password)
        .bind(&user.totp_secret)
        .bind(user.disabled)
        .bind(source)
        .bind(user.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        if id == GOD_USER_ID {
            return Err(RepositoryError::Conflict("god user cannot be deleted".into()));
        }
        sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::open_in_memory;

    #[tokio::test]
    async fn god_user_cannot_be_deleted() {
        let pool = open_in_memory().await;
        let repo = SqliteUserRepository::new(pool);
        let err = repo.delete(GOD_USER_ID).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn created_user_round_trips() {
        let pool = open_in_memory().await;
        let repo = SqliteUserRepository::new(pool);
        let created = repo
            .create(&User {
                id: 0,
                username: "alice".into(),
                password_hash: "hash".into(),
                must_change_password: false,
                totp_secret: None,
                disabled: false,
                source: UserSource::Local,
            })
            .await
            .unwrap();
        let fetched = repo.find_by_username("alice").await.unwrap();
        assert_eq!(fetched.id, created.id);
    }
}
