// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! `WS /ws/monitor` — cookie-authenticated upgrade that fans
//! `EventEnvelope`s out to the browser, filtered by the session's
//! effective permission set (spec §4.9, §6).

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;

use crate::domain::events::EventEnvelope;
use crate::domain::identity::Permission;
use crate::presentation::error::{bearer_token, ApiError};
use crate::presentation::state::AppState;

/// Maps an event's topic to the read permission that gates it. A
/// topic with no listed gate is visible to every authenticated
/// session (spec §4.9: "a connection unable to see a topic silently
/// does not receive it", not an upgrade-time rejection).
fn required_permission(topic: &str) -> Option<Permission> {
    if topic.starts_with("zfs.") {
        Some(Permission::StorageRead)
    } else if topic.starts_with("docker.") {
        Some(Permission::DockerRead)
    } else if topic.starts_with("gitops.") {
        Some(Permission::GitopsRead)
    } else {
        None
    }
}

fn visible(topic: &str, permissions: &HashSet<Permission>) -> bool {
    match required_permission(topic) {
        Some(perm) => permissions.contains(&perm),
        None => true,
    }
}

pub async fn monitor(State(state): State<Arc<AppState>>, headers: HeaderMap, ws: WebSocketUpgrade) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)?;
    let auth = state.rbac.authenticate(&token).await?;
    let permissions = auth.permissions;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, permissions)))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, permissions: HashSet<Permission>) {
    let mut receiver = state.events.subscribe(Vec::new());

    loop {
        tokio::select! {
            event = receiver.recv() => {
                let Some(envelope) = event else { break };
                if !visible(&envelope.topic, &permissions) {
                    continue;
                }
                if send_envelope(&mut socket, &envelope).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.events.unsubscribe(receiver.id);
}

async fn send_envelope(socket: &mut WebSocket, envelope: &EventEnvelope) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text.into())).await
}
