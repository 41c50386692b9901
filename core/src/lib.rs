// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # dplane-core
//!
//! Domain model, application services, infrastructure adapters and the
//! HTTP/WebSocket presentation layer for the D-PlaneOS control plane.
//!
//! ## Layer structure
//!
//! ```text
//! presentation/   ← axum HTTP API, WebSocket event fanout
//!     ↓
//! application/    ← RBAC, reconciliation (diff/apply/drift), health, alerts
//!     ↓
//! domain/         ← entities, value objects, the command whitelist, events
//!     ↓
//! infrastructure/ ← sqlite repositories, process executor, Docker client,
//!                   networkd writer, audit chain, event hub
//! ```

pub mod config;
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use config::NodeConfig;
pub use domain::DplaneError;
