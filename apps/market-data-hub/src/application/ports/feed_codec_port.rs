//! Feed Codec Port (Driven Port)
//!
//! Interface for turning raw frames into quotes and subscription changes into
//! control frames. The hub never inspects payloads itself.

use crate::application::ports::Frame;
use crate::domain::quote::{Quote, Symbol};

/// Codec error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Payload could not be parsed.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Frame type the codec does not handle.
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),

    /// A control frame could not be built.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Port for decoding feed frames and encoding control frames.
pub trait FeedCodec: Send + Sync {
    /// Decode a data frame into zero or more quotes.
    ///
    /// Control and acknowledgement messages decode to an empty vector.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the frame cannot be decoded; the caller drops
    /// the frame and continues.
    fn decode(&self, frame: &Frame) -> Result<Vec<Quote>, CodecError>;

    /// Build the control frame that subscribes to `symbols`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode_subscribe(&self, symbols: &[Symbol]) -> Result<Frame, CodecError>;

    /// Build the control frame that unsubscribes from `symbols`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode_unsubscribe(&self, symbols: &[Symbol]) -> Result<Frame, CodecError>;
}
