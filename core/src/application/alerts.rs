// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! AlertPipeline — per-key `{ok, pending, firing}` debounce with
//! hysteresis/cooldown hold times and multi-sink dispatch with
//! bounded exponential-backoff retry (spec §4.10).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::config::AlertsConfig;
use crate::domain::audit::AuditKind;
use crate::domain::events::DomainEvent;
use crate::domain::repository::{WebhookConfig, WebhookRepository};
use crate::infrastructure::audit::AuditChain;
use crate::infrastructure::event_bus::EventHub;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertState {
    Ok,
    Pending { faulting_since: Instant },
    Firing { recovering_since: Option<Instant> },
}

struct AlertKeyState {
    state: AlertState,
    message: String,
}

/// Drives alert-key transitions and fans transitions into
/// firing/resolved out to configured sinks (spec §4.10).
pub struct AlertPipeline {
    webhooks: Arc<dyn WebhookRepository>,
    events: Arc<EventHub>,
    audit: Arc<AuditChain>,
    http: reqwest::Client,
    mailer: Option<lettre::AsyncSmtpTransport<lettre::Tokio1Executor>>,
    keys: Mutex<HashMap<String, AlertKeyState>>,
    config: AlertsConfig,
}

impl AlertPipeline {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        events: Arc<EventHub>,
        audit: Arc<AuditChain>,
        mailer: Option<lettre::AsyncSmtpTransport<lettre::Tokio1Executor>>,
        config: AlertsConfig,
    ) -> Self {
        Self { webhooks, events, audit, http: reqwest::Client::new(), mailer, keys: Mutex::new(HashMap::new()), config }
    }

    /// Called by background workers (heartbeat, capacity guardian,
    /// chain verification) whenever a fault condition is sampled.
    /// `faulting` reflects the instantaneous reading; the hold timers
    /// absorb the flapping.
    pub async fn sample(&self, key: &str, faulting: bool, message: &str) {
        let hysteresis = Duration::from_secs(self.config.hysteresis_seconds);
        let cooldown = Duration::from_secs(self.config.cooldown_seconds);
        let now = Instant::now();
        let mut keys = self.keys.lock().await;
        let entry = keys.entry(key.to_string()).or_insert(AlertKeyState { state: AlertState::Ok, message: message.to_string() });
        entry.message = message.to_string();

        let transition = match entry.state {
            AlertState::Ok if faulting => {
                entry.state = AlertState::Pending { faulting_since: now };
                None
            }
            AlertState::Pending { faulting_since } => {
                if !faulting {
                    entry.state = AlertState::Ok;
                    None
                } else if now.duration_since(faulting_since) >= hysteresis {
                    entry.state = AlertState::Firing { recovering_since: None };
                    Some(true)
                } else {
                    None
                }
            }
            AlertState::Firing { recovering_since } => {
                if faulting {
                    entry.state = AlertState::Firing { recovering_since: None };
                    None
                } else {
                    let since = recovering_since.unwrap_or(now);
                    if recovering_since.is_none() {
                        entry.state = AlertState::Firing { recovering_since: Some(now) };
                        None
                    } else if now.duration_since(since) >= cooldown {
                        entry.state = AlertState::Ok;
                        Some(false)
                    } else {
                        None
                    }
                }
            }
            AlertState::Ok => None,
        };

        let message = entry.message.clone();
        drop(keys);

        match transition {
            Some(true) => {
                self.events.publish(DomainEvent::AlertFiring { key: key.to_string(), message: message.clone() }, chrono::Utc::now());
                self.dispatch(key, &message, true).await;
            }
            Some(false) => {
                self.events.publish(DomainEvent::AlertResolved { key: key.to_string() }, chrono::Utc::now());
                self.dispatch(key, &message, false).await;
            }
            None => {}
        }
    }

    /// Sends one test notification through a single webhook, bypassing
    /// the debounce state machine entirely — used by the
    /// `/alerts/webhooks/{id}/test` route (spec §6).
    pub async fn test_dispatch(&self, webhook: &WebhookConfig) -> Result<(), SinkError> {
        self.send_to_sink(webhook, "test", "test notification from D-PlaneOS", true).await
    }

    async fn dispatch(&self, key: &str, message: &str, firing: bool) {
        let webhooks = match self.webhooks.list().await {
            Ok(w) => w,
            Err(err) => {
                tracing::error!(error = %err, "failed to load webhook sinks for dispatch");
                return;
            }
        };
        for webhook in webhooks.into_iter().filter(|w| w.enabled) {
            self.dispatch_with_retry(key, message, firing, &webhook).await;
        }
    }

    /// Exponential backoff 1s→2s→4s→8s→16s, max 5 attempts. Terminal
    /// failure is audited and never retried again for this
    /// transition (spec §4.10).
    async fn dispatch_with_retry(&self, key: &str, message: &str, firing: bool, webhook: &WebhookConfig) {
        let mut delay = BACKOFF_BASE;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.send_to_sink(webhook, key, message, firing).await {
                Ok(()) => return,
                Err(err) if attempt == MAX_ATTEMPTS => {
                    tracing::error!(sink = %webhook.id, error = %err, "alert dispatch exhausted retries");
                    self.audit
                        .record(
                            AuditKind::AlertFired,
                            "alert-pipeline",
                            "dispatch.exhausted",
                            &webhook.id.to_string(),
                            serde_json::json!({"key": key, "error": err.to_string()}),
                        )
                        .await;
                    return;
                }
                Err(err) => {
                    tracing::warn!(sink = %webhook.id, attempt, error = %err, "alert dispatch failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn send_to_sink(&self, webhook: &WebhookConfig, key: &str, message: &str, firing: bool) -> Result<(), SinkError> {
        match webhook.kind.as_str() {
            "webhook" => self.send_webhook(webhook, key, message, firing).await,
            "smtp" => self.send_smtp(webhook, key, message, firing).await,
            other => {
                tracing::warn!(kind = other, "unknown alert sink kind, skipping");
                Ok(())
            }
        }
    }

    async fn send_webhook(&self, webhook: &WebhookConfig, key: &str, message: &str, firing: bool) -> Result<(), SinkError> {
        let body = serde_json::json!({"key": key, "message": message, "firing": firing});
        let mut request = self.http.post(&webhook.url).json(&body);
        if let Some(secret) = &webhook.secret {
            request = request.header("X-Dplane-Secret", secret);
        }
        let response = request.send().await.map_err(|e| SinkError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn send_smtp(&self, webhook: &WebhookConfig, key: &str, message: &str, firing: bool) -> Result<(), SinkError> {
        let Some(mailer) = &self.mailer else {
            return Err(SinkError::Transport("no SMTP transport configured".into()));
        };
        let verb = if firing { "FIRING" } else { "RESOLVED" };
        let from = self.config.smtp_from.as_deref().unwrap_or("d-planeos@localhost");
        let email = lettre::Message::builder()
            .from(from.parse().map_err(|e: lettre::address::AddressError| SinkError::Transport(e.to_string()))?)
            .to(webhook.url.parse().map_err(|e: lettre::address::AddressError| SinkError::Transport(e.to_string()))?)
            .subject(format!("[{verb}] {key}"))
            .body(message.to_string())
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        use lettre::AsyncTransport;
        mailer.send(email).await.map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("sink responded with status {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_is_1_2_4_8_16_seconds() {
        let mut delay = BACKOFF_BASE;
        let mut seen = vec![delay];
        for _ in 1..MAX_ATTEMPTS {
            delay *= 2;
            seen.push(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16].into_iter().map(Duration::from_secs).collect::<Vec<_>>());
    }
}
