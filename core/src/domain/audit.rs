// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Audit chain entries (spec §4.2). Each entry's HMAC covers its own
//! fields plus the previous entry's HMAC, forming a tamper-evident
//! chain anchored at `seq == 0` with a fixed genesis hash.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AuditKind {
    AuthSuccess,
    AuthFailure,
    CommandExecuted,
    CommandBlocked,
    StateApplied,
    StateRejected,
    RoleGranted,
    RoleRevoked,
    AlertFired,
    AlertResolved,
    ChainVerificationFailed,
}

impl AuditKind {
    /// Security-critical kinds bypass the async queue and are
    /// persisted synchronously before the triggering call returns
    /// (spec §4.2/§5).
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            AuditKind::AuthFailure
                | AuditKind::CommandBlocked
                | AuditKind::RoleGranted
                | AuditKind::RoleRevoked
                | AuditKind::ChainVerificationFailed
        )
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub actor: String,
    pub action: String,
    pub target: Option<String>,
    pub detail: serde_json::Value,
    pub prev_hash: [u8; 32],
    pub hmac: [u8; 32],
}

impl AuditEntry {
    /// Fields covered by the HMAC, in a fixed order, so the signature
    /// is reproducible independent of JSON map ordering.
    fn signing_payload(
        seq: u64,
        id: &Uuid,
        timestamp: &DateTime<Utc>,
        kind: &AuditKind,
        actor: &str,
        action: &str,
        target: Option<&str>,
        detail: &serde_json::Value,
        prev_hash: &[u8; 32],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(id.as_bytes());
        buf.extend_from_slice(timestamp.timestamp_nanos_opt().unwrap_or(0).to_be_bytes().as_slice());
        buf.extend_from_slice(serde_json::to_string(kind).unwrap_or_default().as_bytes());
        buf.extend_from_slice(actor.as_bytes());
        buf.extend_from_slice(action.as_bytes());
        buf.extend_from_slice(target.unwrap_or("").as_bytes());
        buf.extend_from_slice(detail.to_string().as_bytes());
        buf.extend_from_slice(prev_hash);
        buf
    }

    pub fn seal(
        seq: u64,
        kind: AuditKind,
        actor: String,
        action: String,
        target: Option<String>,
        detail: serde_json::Value,
        prev_hash: [u8; 32],
        timestamp: DateTime<Utc>,
        key: &[u8],
    ) -> Self {
        let id = Uuid::new_v4();
        let payload = Self::signing_payload(
            seq, &id, &timestamp, &kind, &actor, &action, target.as_deref(), &detail, &prev_hash,
        );
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(&payload);
        let hmac = mac.finalize().into_bytes().into();

        AuditEntry {
            seq,
            id,
            timestamp,
            kind,
            actor,
            action,
            target,
            detail,
            prev_hash,
            hmac,
        }
    }

    /// Recomputes the HMAC and compares; `false` means either this
    /// entry was tampered with or `prev_hash` no longer matches its
    /// predecessor.
    pub fn verify(&self, key: &[u8]) -> bool {
        let payload = Self::signing_payload(
            self.seq,
            &self.id,
            &self.timestamp,
            &self.kind,
            &self.actor,
            &self.action,
            self.target.as_deref(),
            &self.detail,
            &self.prev_hash,
        );
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(&payload);
        mac.verify_slice(&self.hmac).is_ok()
    }

    pub fn chain_hash(&self) -> [u8; 32] {
        self.hmac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_entry_verifies_with_same_key() {
        let key = b"test-key";
        let entry = AuditEntry::seal(
            0,
            AuditKind::AuthSuccess,
            "alice".into(),
            "login".into(),
            None,
            serde_json::json!({}),
            GENESIS_HASH,
            Utc::now(),
            key,
        );
        assert!(entry.verify(key));
    }

    #[test]
    fn tampered_action_fails_verification() {
        let key = b"test-key";
        let mut entry = AuditEntry::seal(
            0,
            AuditKind::AuthSuccess,
            "alice".into(),
            "login".into(),
            None,
            serde_json::json!({}),
            GENESIS_HASH,
            Utc::now(),
            key,
        );
        entry.action = "login-as-root".into();
        assert!(!entry.verify(key));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let entry = AuditEntry::seal(
            0,
            AuditKind::AuthSuccess,
            "alice".into(),
            "login".into(),
            None,
            serde_json::json!({}),
            GENESIS_HASH,
            Utc::now(),
            b"key-one",
        );
        assert!(!entry.verify(b"key-two"));
    }
}
