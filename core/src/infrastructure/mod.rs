// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Concrete adapters: SQLite repositories, the whitelisted command
//! executor, the Docker and systemd-networkd clients, and the
//! async-queued audit chain.

pub mod audit;
pub mod db;
pub mod docker_client;
pub mod event_bus;
pub mod executor;
pub mod networkd;
pub mod repositories;
pub mod smart;
pub mod zfs_cli;
