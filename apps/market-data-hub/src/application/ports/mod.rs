//! Application Ports (Driven)
//!
//! Ports define the interfaces the hub uses to reach external systems. The
//! infrastructure layer provides the WebSocket and JSON implementations;
//! tests substitute in-memory ones.
//!
//! - `Connector`: opens frame connections to the upstream feed
//! - `FeedCodec`: decodes quotes and encodes subscription control frames

mod connector_port;
mod feed_codec_port;

pub use connector_port::{Connection, Connector, Frame, FrameSink, FrameStream, TransportError};
pub use feed_codec_port::{CodecError, FeedCodec};
