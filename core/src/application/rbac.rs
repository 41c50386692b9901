// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! RBACGuard — session lookup then permission check, fail-closed on
//! any database error (spec §4.3).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::identity::Permission;
use crate::domain::repository::{RoleRepository, SessionRepository, UserRepository};
use crate::domain::session::Session;
use crate::domain::DplaneError;

const PERMISSION_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedPermissions {
    permissions: HashSet<Permission>,
    cached_at: Instant,
}

pub struct AuthenticatedRequest {
    pub session: Session,
    pub user_id: i64,
    pub permissions: HashSet<Permission>,
}

/// Session and permission lookups wired as an explicit collaborator
/// rather than a global, per the redesign note in spec §9.
pub struct RbacGuard {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    permission_cache: DashMap<i64, CachedPermissions>,
}

impl RbacGuard {
    pub fn new(sessions: Arc<dyn SessionRepository>, users: Arc<dyn UserRepository>, roles: Arc<dyn RoleRepository>) -> Self {
        Self { sessions, users, roles, permission_cache: DashMap::new() }
    }

    /// First session lookup (`AuthFailure` -> 401 upstream), then
    /// permission check (`Forbidden` -> 403). Any repository error
    /// denies the request rather than propagating (spec §4.3).
    pub async fn authorize(&self, raw_token: &str, required: Permission) -> Result<AuthenticatedRequest, DplaneError> {
        let authed = self.authenticate(raw_token).await?;
        if !authed.permissions.contains(&required) {
            return Err(DplaneError::Forbidden);
        }
        Ok(authed)
    }

    /// Session-only check, no permission required — for "none/self"
    /// routes (spec §6) such as logout and self password/TOTP changes,
    /// which must stay reachable even for the permission-less default
    /// `user` role.
    pub async fn authenticate(&self, raw_token: &str) -> Result<AuthenticatedRequest, DplaneError> {
        let token_hash = Session::hash_token(raw_token);
        let session = self.sessions.find_by_token_hash(&token_hash).await.map_err(|_| DplaneError::AuthFailure)?;

        if !session.matches(raw_token) || session.is_expired(chrono::Utc::now()) {
            return Err(DplaneError::AuthFailure);
        }

        let now = chrono::Utc::now();
        let _ = self.sessions.touch(session.id, now).await;

        let permissions = self.effective_permissions(session.user_id).await?;
        Ok(AuthenticatedRequest { user_id: session.user_id, session, permissions })
    }

    async fn effective_permissions(&self, user_id: i64) -> Result<HashSet<Permission>, DplaneError> {
        if let Some(cached) = self.permission_cache.get(&user_id) {
            if cached.cached_at.elapsed() < PERMISSION_CACHE_TTL {
                return Ok(cached.permissions.clone());
            }
        }

        let user = self.users.find_by_id(user_id).await.map_err(|_| DplaneError::AuthFailure)?;
        if user.disabled {
            return Err(DplaneError::AuthFailure);
        }

        let now = chrono::Utc::now();
        let grants = self.roles.grants_for_user(user_id).await.map_err(|_| DplaneError::AuthFailure)?;
        let mut permissions = HashSet::new();
        for grant in grants.iter().filter(|g| g.is_active(now)) {
            let role = self.roles.find(&grant.role_name).await.map_err(|_| DplaneError::AuthFailure)?;
            permissions.extend(role.permissions.iter().copied());
        }

        self.permission_cache.insert(user_id, CachedPermissions { permissions: permissions.clone(), cached_at: Instant::now() });
        Ok(permissions)
    }

    /// Invalidates the cached permission set; called on role grant,
    /// role revoke, or whenever a session is force-rotated.
    pub fn invalidate(&self, user_id: i64) {
        self.permission_cache.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_cache_entry_expires_after_ttl() {
        let cached = CachedPermissions { permissions: HashSet::new(), cached_at: Instant::now() - Duration::from_secs(301) };
        assert!(cached.cached_at.elapsed() >= PERMISSION_CACHE_TTL);
    }
}
