//! Connection state and the observer-facing status flags

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Supervisor connection state; exactly one holds at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Read-mostly connection flags shared with observers
///
/// Only the supervisor writes these. Observers use them for display and
/// must not make control decisions from them. Both flags derive from one
/// atomic, so `connected` and `connecting` are never observed together.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    state: Arc<AtomicU8>,
}

/// Point-in-time copy of [`ConnectionStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub connected: bool,
    pub connecting: bool,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state as last published by the supervisor
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state();
        StatusSnapshot {
            connected: state == ConnectionState::Connected,
            connecting: state == ConnectionState::Connecting,
        }
    }

    pub(crate) fn publish_state(&self, state: ConnectionState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }
}
