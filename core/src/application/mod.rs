// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Use-case services: everything that orchestrates domain types and
//! infrastructure adapters but holds no I/O of its own.

pub mod alerts;
pub mod applier;
pub mod auth_service;
pub mod capacity;
pub mod differ;
pub mod drift;
pub mod health;
pub mod rbac;
