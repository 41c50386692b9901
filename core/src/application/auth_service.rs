// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Login/logout/change-password. Tokens rotate on every privilege
//! change (spec §3, §4.3).

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::domain::identity::User;
use crate::domain::repository::{SessionRepository, UserRepository};
use crate::domain::session::{RawToken, Session};
use crate::domain::DplaneError;
use crate::infrastructure::audit::AuditChain;
use crate::domain::audit::AuditKind;

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    audit: Arc<AuditChain>,
}

pub struct LoginOutcome {
    pub user: User,
    pub session: Session,
    pub raw_token: RawToken,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, sessions: Arc<dyn SessionRepository>, audit: Arc<AuditChain>) -> Self {
        Self { users, sessions, audit }
    }

    pub fn hash_password(plaintext: &str) -> Result<String, DplaneError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| DplaneError::internal(anyhow::anyhow!("password hash: {e}")))
    }

    fn verify_password(plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else { return false };
        Argon2::default().verify_password(plaintext.as_bytes(), &parsed).is_ok()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, DplaneError> {
        let user = match self.users.find_by_username(username).await {
            Ok(user) => user,
            Err(_) => {
                self.audit
                    .record_sync(AuditKind::AuthFailure, username, "login", "", serde_json::json!({"reason": "no such user"}))
                    .await
                    .ok();
                return Err(DplaneError::AuthFailure);
            }
        };

        if user.disabled || !Self::verify_password(password, &user.password_hash) {
            self.audit
                .record_sync(AuditKind::AuthFailure, username, "login", "", serde_json::json!({"reason": "bad credentials"}))
                .await
                .ok();
            return Err(DplaneError::AuthFailure);
        }

        let now = chrono::Utc::now();
        let (session, raw_token) = Session::mint(user.id, now);
        self.sessions.create(&session).await?;
        self.audit.record(AuditKind::AuthSuccess, username, "login", "", serde_json::json!({})).await;

        Ok(LoginOutcome { user, session, raw_token })
    }

    pub async fn logout(&self, session_id: uuid::Uuid, actor: &str) -> Result<(), DplaneError> {
        self.sessions.revoke(session_id).await?;
        self.audit.record(AuditKind::AuthSuccess, actor, "logout", "", serde_json::json!({})).await;
        Ok(())
    }

    /// Invalidates every existing session for the user and mints a
    /// fresh one, so a stolen pre-change token stops working (spec §3).
    pub async fn change_password(&self, user_id: i64, actor: &str, new_password: &str) -> Result<LoginOutcome, DplaneError> {
        let mut user = self.users.find_by_id(user_id).await?;
        user.password_hash = Self::hash_password(new_password)?;
        user.must_change_password = false;
        self.users.update(&user).await?;
        self.sessions.revoke_all_for_user(user_id).await?;

        let now = chrono::Utc::now();
        let (session, raw_token) = Session::mint(user_id, now);
        self.sessions.create(&session).await?;
        self.audit.record_sync(AuditKind::AuthSuccess, actor, "change-password", "", serde_json::json!({})).await?;

        Ok(LoginOutcome { user, session, raw_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies_against_itself() {
        let hash = AuthService::hash_password("correct-horse-battery-staple").unwrap();
        assert!(AuthService::verify_password("correct-horse-battery-staple", &hash));
        assert!(!AuthService::verify_password("wrong", &hash));
    }
}
