// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder lifecycle state and transport connection ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the transport layer assigns to one inbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a builder.
///
/// `Unconnected → Connected → (Busy ⇄ Idle) → Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Process launched (or about to be), handshake not yet received.
    Unconnected,
    /// Handshake accepted; not yet handed out.
    Connected,
    /// Checked out by a caller.
    Busy,
    /// Connected and available for reuse.
    Idle,
    /// Connection lost or builder removed. Terminal.
    Disconnected,
}

impl WorkerState {
    /// Whether a connection is currently bound.
    pub fn is_connected(&self) -> bool {
        matches!(self, WorkerState::Connected | WorkerState::Busy | WorkerState::Idle)
    }

    /// Whether the builder may be checked out.
    pub fn is_available(&self) -> bool {
        matches!(self, WorkerState::Connected | WorkerState::Idle)
    }
}

crate::simple_display! {
    WorkerState {
        Unconnected => "unconnected",
        Connected => "connected",
        Busy => "busy",
        Idle => "idle",
        Disconnected => "disconnected",
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
