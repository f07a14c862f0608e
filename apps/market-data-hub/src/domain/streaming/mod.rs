//! Streaming Connection Types
//!
//! Connection lifecycle states reported by the transport. Transitions are
//! owned exclusively by the transport; everything else only observes them.

use std::fmt;

/// Lifecycle state of the upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session. Also the terminal state after reconnect attempts run out.
    #[default]
    Disconnected,
    /// Initial connection in progress.
    Connecting,
    /// Connected and streaming.
    Connected,
    /// Session lost, waiting before reconnection attempt `attempt`.
    Reconnecting {
        /// Reconnection attempt number, starting at 1.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Check if the connection is currently usable.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a session exists (connected, connecting or reconnecting).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
        }
    }

    /// Numeric encoding for metrics gauges.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting { .. } => 3.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt } => write!(f, "reconnecting({attempt})"),
            other => f.write_str(other.as_str()),
        }
    }
}
