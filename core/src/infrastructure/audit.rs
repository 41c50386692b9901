// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Append-only audit chain: a bounded queue drained by a background
//! task for routine entries, with a synchronous path for
//! security-critical kinds that must hit disk before the caller's
//! request completes (spec §4.8).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::domain::audit::{AuditEntry, AuditKind, GENESIS_HASH};
use crate::domain::repository::AuditRepository;

const QUEUE_DEPTH: usize = 4096;

struct ChainState {
    seq: u64,
    prev_hash: [u8; 32],
}

pub struct AuditChain {
    repo: Arc<dyn AuditRepository>,
    key: Arc<[u8]>,
    state: Mutex<ChainState>,
    tx: mpsc::Sender<AuditEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditChainError {
    #[error(transparent)]
    Repository(#[from] crate::domain::repository::RepositoryError),
    #[error("audit queue is full")]
    QueueFull,
}

impl From<AuditChainError> for crate::domain::DplaneError {
    fn from(e: AuditChainError) -> Self {
        match e {
            AuditChainError::Repository(r) => r.into(),
            AuditChainError::QueueFull => crate::domain::DplaneError::Transient("audit queue full".into()),
        }
    }
}

impl AuditChain {
    /// Loads the current chain tip from storage and spawns the
    /// background drain task. Returns the chain handle and the task's
    /// join handle so the caller can await it at shutdown.
    pub async fn start(
        repo: Arc<dyn AuditRepository>,
        key: Arc<[u8]>,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), AuditChainError> {
        let (seq, prev_hash) = match repo.last().await? {
            Some(entry) => (entry.seq + 1, entry.chain_hash()),
            None => (0, GENESIS_HASH),
        };
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(QUEUE_DEPTH);
        let chain = Arc::new(Self { repo: repo.clone(), key, state: Mutex::new(ChainState { seq, prev_hash }), tx });

        let drain_repo = repo;
        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(err) = drain_repo.append(&entry).await {
                    tracing::error!(error = %err, seq = entry.seq, "failed to persist audit entry");
                }
            }
        });

        Ok((chain, handle))
    }

    /// Seals and queues a routine entry. May be dropped under
    /// sustained overload; security-critical kinds must use
    /// [`Self::record_sync`] instead.
    pub async fn record(&self, kind: AuditKind, actor: &str, action: &str, target: &str, detail: Value) {
        debug_assert!(!kind.is_security_critical(), "use record_sync for security-critical audit kinds");
        if let Ok(entry) = self.seal_next(kind, actor, action, target, detail).await {
            if self.tx.try_send(entry).is_err() {
                tracing::error!("audit queue full, routine entry dropped");
            }
        }
    }

    /// Seals and writes a security-critical entry synchronously,
    /// returning only after it is durable.
    pub async fn record_sync(
        &self,
        kind: AuditKind,
        actor: &str,
        action: &str,
        target: &str,
        detail: Value,
    ) -> Result<(), AuditChainError> {
        let entry = self.seal_next(kind, actor, action, target, detail).await?;
        self.repo.append(&entry).await?;
        Ok(())
    }

    async fn seal_next(
        &self,
        kind: AuditKind,
        actor: &str,
        action: &str,
        target: &str,
        detail: Value,
    ) -> Result<AuditEntry, AuditChainError> {
        let mut state = self.state.lock().await;
        let target = if target.is_empty() { None } else { Some(target.to_string()) };
        let entry = AuditEntry::seal(
            state.seq,
            kind,
            actor.to_string(),
            action.to_string(),
            target,
            detail,
            state.prev_hash,
            chrono::Utc::now(),
            &self.key,
        );
        state.seq += 1;
        state.prev_hash = entry.chain_hash();
        Ok(entry)
    }

    /// Re-verifies the full chain against the signing key, returning
    /// the sequence number of the first broken link, if any.
    pub async fn verify_chain(&self) -> Result<Option<u64>, AuditChainError> {
        let count = self.repo.count().await?;
        if count == 0 {
            return Ok(None);
        }
        let entries = self.repo.range(0, count - 1).await?;
        let mut expected_prev = GENESIS_HASH;
        for entry in &entries {
            if entry.prev_hash != expected_prev || !entry.verify(&self.key) {
                return Ok(Some(entry.seq));
            }
            expected_prev = entry.chain_hash();
        }
        Ok(None)
    }
}
