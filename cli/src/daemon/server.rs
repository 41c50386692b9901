// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon bootstrap: loads configuration, opens the SQLite store,
//! wires every application/infrastructure service into one `AppState`,
//! spawns the background supervisors (heartbeat, capacity guardian,
//! drift detector), and serves the HTTP/WebSocket API until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use dplane_core::application::alerts::AlertPipeline;
use dplane_core::application::auth_service::AuthService;
use dplane_core::application::capacity::CapacityGuardian;
use dplane_core::application::drift::DriftDetector;
use dplane_core::application::health::Heartbeat;
use dplane_core::application::rbac::RbacGuard;
use dplane_core::domain::command::Whitelist;
use dplane_core::infrastructure::audit::AuditChain;
use dplane_core::infrastructure::db;
use dplane_core::infrastructure::docker_client::DockerClient;
use dplane_core::infrastructure::event_bus::EventHub;
use dplane_core::infrastructure::executor::Executor;
use dplane_core::infrastructure::repositories::{
    SqliteAuditRepository, SqliteGitopsStateRepository, SqliteRoleRepository, SqliteSessionRepository, SqliteUserRepository, SqliteWebhookRepository,
};
use dplane_core::presentation::state::{ApprovalStore, AppState};
use dplane_core::presentation::rate_limit::SessionRateLimiter;
use dplane_core::NodeConfig;

use super::{remove_pid_file, write_pid_file};

/// Overrides the daemon subcommand accepts over the config file,
/// mirroring spec §6's `--db`/`--listen` daemon CLI surface.
pub struct DaemonStartArgs {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub listen_addr: Option<String>,
}

pub async fn start_daemon(args: DaemonStartArgs) -> Result<()> {
    let pid = std::process::id();
    write_pid_file(pid)?;
    let _guard = PidFileGuard;

    info!(pid, "d-planeos daemon starting");

    let mut config = NodeConfig::load_or_default(args.config_path).context("failed to load configuration")?;
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(backup_path) = args.backup_path {
        config.backup_path = Some(backup_path);
    }
    if let Some(listen_addr) = args.listen_addr {
        config.listen_addr = listen_addr;
    }
    config.validate().context("configuration validation failed")?;

    install_metrics_exporter(&config);

    let pool = db::open(&config.db_path).await.context("failed to open the embedded database")?;

    let users: Arc<dyn dplane_core::domain::repository::UserRepository> = Arc::new(SqliteUserRepository::new(pool.clone()));
    let sessions: Arc<dyn dplane_core::domain::repository::SessionRepository> = Arc::new(SqliteSessionRepository::new(pool.clone()));
    let roles: Arc<dyn dplane_core::domain::repository::RoleRepository> = Arc::new(SqliteRoleRepository::new(pool.clone()));
    let audit_repo: Arc<dyn dplane_core::domain::repository::AuditRepository> = Arc::new(SqliteAuditRepository::new(pool.clone()));
    let gitops: Arc<dyn dplane_core::domain::repository::GitopsStateRepository> = Arc::new(SqliteGitopsStateRepository::new(pool.clone()));
    let webhooks: Arc<dyn dplane_core::domain::repository::WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool.clone()));

    let hmac_key = load_or_create_hmac_key(&config.hmac_key_path).context("failed to load the audit chain's HMAC key")?;
    let (audit, audit_drain) = AuditChain::start(audit_repo.clone(), hmac_key).await.context("failed to start the audit chain")?;

    let executor = Arc::new(Executor::new(Whitelist::standard()));
    let docker = Arc::new(DockerClient::connect().context("failed to connect to the Docker daemon")?);
    let events = Arc::new(EventHub::new());

    let rbac = Arc::new(RbacGuard::new(sessions.clone(), users.clone(), roles));
    let auth = Arc::new(AuthService::new(users.clone(), sessions.clone(), audit.clone()));

    let mailer = config
        .alerts
        .smtp_relay
        .as_deref()
        .map(|relay| lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::relay(relay).map(|b| b.build()))
        .transpose()
        .context("failed to configure the SMTP alert sink")?;
    let alerts = Arc::new(AlertPipeline::new(webhooks.clone(), events.clone(), audit.clone(), mailer, config.alerts.clone()));

    let heartbeat = Arc::new(Heartbeat::new(executor.clone(), docker.clone(), events.clone(), audit.clone()));
    let _heartbeat_task = heartbeat.spawn();

    let capacity_guardian = Arc::new(CapacityGuardian::new(executor.clone(), events.clone(), audit.clone(), alerts.clone(), config.capacity));
    let _capacity_task = capacity_guardian.spawn();

    let drift_detector = Arc::new(DriftDetector::new(executor.clone(), gitops.clone(), events.clone()));
    let _drift_task = drift_detector.spawn();

    let rate_limiter = SessionRateLimiter::new(&config.rate_limit);

    let app_state = Arc::new(AppState {
        start_time: std::time::Instant::now(),
        config,
        executor,
        docker,
        events,
        audit: audit.clone(),
        rbac,
        auth,
        alerts,
        users,
        sessions,
        audit_repo,
        gitops,
        webhooks,
        approvals: ApprovalStore::default(),
        rate_limiter,
    });

    let listen_addr = app_state.config.listen_addr.clone();
    let router = dplane_core::presentation::router(app_state);

    let listener = TcpListener::bind(&listen_addr).await.with_context(|| format!("failed to bind {listen_addr}"))?;
    info!("daemon listening on {listen_addr}");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await.context("HTTP server failed")?;

    // The background supervisors hold their own `Arc<AuditChain>` clones and
    // keep running past the HTTP accept loop's shutdown, so the audit queue
    // can't be observed to close here. Give it a grace period to flush
    // in-flight entries before the process exits (spec §4.2's "every command
    // is recorded before the audit chain is considered caught up").
    info!("daemon shutting down, giving the audit queue a grace period to drain");
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    audit_drain.abort();

    Ok(())
}

/// Reads the HMAC key used to sign the audit chain, generating and
/// persisting a fresh 256-bit key on first boot (spec §4.2).
fn load_or_create_hmac_key(path: &std::path::Path) -> Result<Arc<[u8]>> {
    if let Ok(existing) = std::fs::read(path) {
        return Ok(Arc::from(existing.into_boxed_slice()));
    }
    use rand::RngCore;
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {parent:?}"))?;
    }
    std::fs::write(path, key).with_context(|| format!("failed to write HMAC key to {path:?}"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!(?path, "generated a new audit chain HMAC key");
    Ok(Arc::from(key.to_vec().into_boxed_slice()))
}

fn install_metrics_exporter(config: &NodeConfig) {
    let Some(addr) = &config.observability.metrics_addr else {
        return;
    };
    let Ok(socket_addr) = addr.parse::<std::net::SocketAddr>() else {
        tracing::warn!(addr, "invalid metrics_addr, skipping Prometheus exporter");
        return;
    };
    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(socket_addr).install() {
        tracing::warn!(error = %err, "failed to install Prometheus exporter");
    }
}

struct PidFileGuard;

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let _ = remove_pid_file();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
