// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the `dplaned` administrative CLI.

pub mod audit;
pub mod config;
pub mod daemon;
pub mod state;

pub use self::audit::AuditCommand;
pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::state::StateCommand;
