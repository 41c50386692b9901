// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the tamper-evident audit chain:
//! 1. Seal a run of entries through a real SQLite-backed repository.
//! 2. Verify the freshly-sealed chain is intact.
//! 3. Mutate one entry in place, bypassing the chain API.
//! 4. Verify chain verification reports the first broken link.

use std::sync::Arc;

use dplane_core::infrastructure::audit::AuditChain;
use dplane_core::infrastructure::db;
use dplane_core::infrastructure::repositories::SqliteAuditRepository;
use sqlx::Row;

async fn open_test_pool() -> (sqlx::SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("audit-test.db");
    let pool = db::open(&db_path).await.expect("open test database");
    (pool, dir)
}

#[tokio::test]
async fn chain_of_one_hundred_entries_verifies_clean() {
    let (pool, _dir) = open_test_pool().await;
    let repo: Arc<dyn dplane_core::domain::repository::AuditRepository> = Arc::new(SqliteAuditRepository::new(pool));
    let key: Arc<[u8]> = Arc::from(b"integration-test-hmac-key".to_vec().into_boxed_slice());

    let (chain, drain) = AuditChain::start(repo, key).await.expect("start audit chain");

    for i in 0..100u32 {
        chain
            .record_sync(
                dplane_core::domain::audit::AuditKind::CommandExecuted,
                "operator",
                "zpool.status",
                "tank",
                serde_json::json!({"step": i}),
            )
            .await
            .expect("sealed entry persists");
    }

    assert_eq!(chain.verify_chain().await.expect("verify chain"), None);
    drain.abort();
}

#[tokio::test]
async fn tampered_entry_is_reported_as_the_first_bad_link() {
    let (pool, _dir) = open_test_pool().await;
    let repo: Arc<dyn dplane_core::domain::repository::AuditRepository> = Arc::new(SqliteAuditRepository::new(pool.clone()));
    let key: Arc<[u8]> = Arc::from(b"integration-test-hmac-key".to_vec().into_boxed_slice());

    let (chain, drain) = AuditChain::start(repo, key).await.expect("start audit chain");

    for i in 0..100u32 {
        chain
            .record_sync(
                dplane_core::domain::audit::AuditKind::CommandExecuted,
                "operator",
                "zpool.status",
                "tank",
                serde_json::json!({"step": i}),
            )
            .await
            .expect("sealed entry persists");
    }

    // Mutate entry 37's detail in place, bypassing AuditChain entirely,
    // simulating an operator editing the database directly.
    let row = sqlx::query("SELECT detail FROM audit_entries WHERE seq = 37").fetch_one(&pool).await.expect("fetch entry 37");
    let original: String = row.try_get("detail").unwrap();
    assert_ne!(original, r#"{"tampered":true}"#);
    sqlx::query("UPDATE audit_entries SET detail = ? WHERE seq = 37")
        .bind(r#"{"tampered":true}"#)
        .execute(&pool)
        .await
        .expect("tamper with entry 37");

    let first_bad = chain.verify_chain().await.expect("verify chain");
    assert_eq!(first_bad, Some(37));
    drain.abort();
}
