// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Session tokens (spec §3, §4.3). Opaque 256-bit tokens; only the
//! SHA-256 hash of a token is ever persisted or compared, and that
//! comparison must be constant-time.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const SESSION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: i64,
    pub token_hash: [u8; 32],
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The bearer token handed to the client. Exists only at mint time and
/// in the `Authorization` header — never stored.
pub struct RawToken(pub String);

impl Session {
    pub fn mint(user_id: i64, now: DateTime<Utc>) -> (Session, RawToken) {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let token_hash = Sha256::digest(raw.as_bytes()).into();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            created_at: now,
            last_seen_at: now,
            expires_at: now + Duration::minutes(SESSION_TTL_MINUTES),
        };
        (session, RawToken(raw))
    }

    pub fn hash_token(raw: &str) -> [u8; 32] {
        Sha256::digest(raw.as_bytes()).into()
    }

    pub fn matches(&self, raw: &str) -> bool {
        let candidate = Self::hash_token(raw);
        self.token_hash.ct_eq(&candidate).into()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn renew(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now;
        self.expires_at = now + Duration::minutes(SESSION_TTL_MINUTES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_matches_its_own_session() {
        let now = Utc::now();
        let (session, raw) = Session::mint(42, now);
        assert!(session.matches(&raw.0));
        assert!(!session.matches("wrong-token-value"));
    }

    #[test]
    fn session_expires_after_ttl() {
        let now = Utc::now();
        let (session, _raw) = Session::mint(1, now);
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::minutes(SESSION_TTL_MINUTES + 1)));
    }
}
