//! Connector Port (Driven Port)
//!
//! Interface for opening a bidirectional frame connection to the upstream
//! market data endpoint. The transport owns the returned [`Connection`] and
//! drives both halves from its supervisor task.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, Stream};

// =============================================================================
// Frame
// =============================================================================

/// A single transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Liveness probe.
    Ping(Vec<u8>),
    /// Liveness probe response.
    Pong(Vec<u8>),
    /// Peer closed the connection.
    Close,
}

impl Frame {
    /// Whether this frame carries application data.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Payload length in bytes (zero for `Close`).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) | Self::Ping(bytes) | Self::Pong(bytes) => bytes.len(),
            Self::Close => 0,
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No active connection.
    #[error("not connected")]
    NotConnected,

    /// Opening the connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Reading from the connection failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// No inbound traffic after a liveness probe.
    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(Duration),
}

// =============================================================================
// Connection
// =============================================================================

/// Outbound half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open connection split into its write and read halves.
pub struct Connection {
    /// Write half.
    pub sink: FrameSink,
    /// Read half.
    pub stream: FrameStream,
}

impl Connection {
    /// Wrap a sink/stream pair.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Frame, Error = TransportError> + Send + 'static,
        St: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

// =============================================================================
// Port
// =============================================================================

/// Port for opening connections to the upstream feed.
///
/// Called once by `connect()` and again for every reconnection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectFailed` if the endpoint cannot be
    /// reached or the handshake fails.
    async fn connect(&self) -> Result<Connection, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frames() {
        assert!(Frame::Text("x".into()).is_data());
        assert!(Frame::Binary(vec![1]).is_data());
        assert!(!Frame::Ping(vec![]).is_data());
        assert!(!Frame::Close.is_data());
    }

    #[test]
    fn frame_len() {
        assert_eq!(Frame::Text("abc".into()).len(), 3);
        assert_eq!(Frame::Pong(vec![1, 2]).len(), 2);
        assert!(Frame::Close.is_empty());
    }

    #[test]
    fn error_display() {
        assert_eq!(TransportError::NotConnected.to_string(), "not connected");
        assert_eq!(
            TransportError::ConnectFailed("refused".into()).to_string(),
            "connection failed: refused"
        );
    }
}
