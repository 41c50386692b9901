// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! SQLite-backed implementations of the domain repository traits.

mod sqlite_audit;
mod sqlite_gitops;
mod sqlite_role;
mod sqlite_session;
mod sqlite_snapshot_schedule;
mod sqlite_user;
mod sqlite_webhook;

pub use sqlite_audit::SqliteAuditRepository;
pub use sqlite_gitops::SqliteGitopsStateRepository;
pub use sqlite_role::SqliteRoleRepository;
pub use sqlite_session::SqliteSessionRepository;
pub use sqlite_snapshot_schedule::SqliteSnapshotScheduleRepository;
pub use sqlite_user::SqliteUserRepository;
pub use sqlite_webhook::SqliteWebhookRepository;
