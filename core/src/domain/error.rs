// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Error taxonomy (spec §7). One enum, not one type per subsystem —
//! every call site that can fail maps its failure into one of these
//! kinds so the HTTP presentation layer has a single place to decide
//! status code and retry semantics.

use uuid::Uuid;

/// A kind from the taxonomy in spec §7. Deliberately flat: callers
/// match on the kind, not on which subsystem produced it.
#[derive(Debug, thiserror::Error)]
pub enum DplaneError {
    #[error("invalid argument: {reason}")]
    InputInvalid { reason: String },

    #[error("authentication failed")]
    AuthFailure,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("blocked: {reason}")]
    Blocked { reason: String },

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("external command failed: {tool} exited {exit_code}: {stderr_tail}")]
    ExternalFailure {
        tool: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error (correlation {correlation_id})")]
    Internal {
        correlation_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
}

impl DplaneError {
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        let correlation_id = Uuid::new_v4();
        let source = source.into();
        tracing::error!(%correlation_id, error = %source, "internal error");
        Self::Internal {
            correlation_id,
            source,
        }
    }

    /// Wire error code per spec §6.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputInvalid { .. } => "invalid_arg",
            Self::AuthFailure => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Blocked { .. } => "blocked",
            Self::Timeout(_) => "timeout",
            Self::ExternalFailure { .. } => "exec_failed",
            Self::Transient(_) => "internal",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::InputInvalid { .. } => 400,
            Self::AuthFailure => 401,
            Self::Forbidden => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Blocked { .. } => 409,
            Self::Timeout(_) => 504,
            Self::ExternalFailure { .. } => 502,
            Self::Transient(_) => 500,
            Self::Internal { .. } => 500,
        }
    }
}

impl From<crate::domain::repository::RepositoryError> for DplaneError {
    fn from(e: crate::domain::repository::RepositoryError) -> Self {
        use crate::domain::repository::RepositoryError as R;
        match e {
            R::NotFound(s) => DplaneError::NotFound(s),
            R::Conflict(s) => DplaneError::Conflict(s),
            R::Corrupt(s) => DplaneError::internal(anyhow::anyhow!("corrupt record: {s}")),
            other => DplaneError::internal(anyhow::anyhow!(other.to_string())),
        }
    }
}
