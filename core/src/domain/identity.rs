// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Users, roles and permissions (spec §3 "User", "Role / Permission").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// User id 1 ("god") is immortal: cannot be deleted, always
/// authenticates locally regardless of its configured source.
pub const GOD_USER_ID: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserSource {
    Local,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2id hash; never serialized back out over the wire.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub must_change_password: bool,
    pub totp_secret: Option<String>,
    pub disabled: bool,
    pub source: UserSource,
}

impl User {
    pub fn is_god(&self) -> bool {
        self.id == GOD_USER_ID
    }

    /// God always authenticates locally even if `source` drifted to
    /// `Directory` through a bulk import — spec §3.
    pub fn effective_source(&self) -> UserSource {
        if self.is_god() {
            UserSource::Local
        } else {
            self.source
        }
    }
}

/// A dotted permission token from the closed set named in spec §3.
/// Closed, not open, so a typo in a route handler fails to compile
/// rather than silently granting nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    StorageRead,
    StorageWrite,
    StorageDelete,
    StorageScrub,
    DockerRead,
    DockerExec,
    NetworkRead,
    NetworkWrite,
    SharesRead,
    SharesWrite,
    GitopsRead,
    GitopsWrite,
    GitopsApprove,
    RolesAssign,
    SystemRead,
    AlertsManage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageRead => "storage:read",
            Self::StorageWrite => "storage:write",
            Self::StorageDelete => "storage:delete",
            Self::StorageScrub => "storage:scrub",
            Self::DockerRead => "docker:read",
            Self::DockerExec => "docker:exec",
            Self::NetworkRead => "network:read",
            Self::NetworkWrite => "network:write",
            Self::SharesRead => "shares:read",
            Self::SharesWrite => "shares:write",
            Self::GitopsRead => "gitops:read",
            Self::GitopsWrite => "gitops:write",
            Self::GitopsApprove => "gitops:approve",
            Self::RolesAssign => "roles:assign",
            Self::SystemRead => "system:read",
            Self::AlertsManage => "alerts:manage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub display_name: String,
    pub is_system: bool,
    pub permissions: HashSet<Permission>,
}

impl Role {
    /// The four immutable system roles (spec §3).
    pub fn system_roles() -> Vec<Role> {
        use Permission::*;
        vec![
            Role {
                name: "admin".into(),
                display_name: "Administrator".into(),
                is_system: true,
                permissions: [
                    StorageRead, StorageWrite, StorageDelete, StorageScrub,
                    DockerRead, DockerExec, NetworkRead, NetworkWrite,
                    SharesRead, SharesWrite, GitopsRead, GitopsWrite,
                    GitopsApprove, RolesAssign, SystemRead, AlertsManage,
                ]
                .into_iter()
                .collect(),
            },
            Role {
                name: "operator".into(),
                display_name: "Operator".into(),
                is_system: true,
                permissions: [
                    StorageRead, StorageWrite, StorageScrub, DockerRead,
                    DockerExec, NetworkRead, SharesRead, SharesWrite,
                    GitopsRead, GitopsWrite, SystemRead,
                ]
                .into_iter()
                .collect(),
            },
            Role {
                name: "viewer".into(),
                display_name: "Viewer".into(),
                is_system: true,
                permissions: [StorageRead, DockerRead, NetworkRead, SharesRead, GitopsRead, SystemRead]
                    .into_iter()
                    .collect(),
            },
            Role {
                name: "user".into(),
                display_name: "User".into(),
                is_system: true,
                permissions: HashSet::new(),
            },
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleGrant {
    pub user_id: i64,
    pub role_name: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserRoleGrant {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn god_user_authenticates_locally_even_if_imported_as_directory() {
        let god = User {
            id: GOD_USER_ID,
            username: "god".into(),
            password_hash: "x".into(),
            must_change_password: false,
            totp_secret: None,
            disabled: false,
            source: UserSource::Directory,
        };
        assert_eq!(god.effective_source(), UserSource::Local);
    }

    #[test]
    fn expired_grant_is_not_active() {
        let grant = UserRoleGrant {
            user_id: 2,
            role_name: "operator".into(),
            expires_at: Some(Utc::now() - chrono::Duration::seconds(1)),
        };
        assert!(!grant.is_active(Utc::now()));
    }
}
