//! Upstream Stream Adapters
//!
//! Everything needed to hold one resilient connection to the market data
//! feed:
//!
//! - `transport`: session supervisor, send path, state machine
//! - `reconnect`: bounded exponential backoff
//! - `heartbeat`: ping scheduling and liveness timeout
//! - `websocket`: `Connector` over tokio-tungstenite
//! - `codec` / `messages`: Alpaca v2 JSON wire format

pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod transport;
pub mod websocket;

pub use codec::JsonFeedCodec;
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::{Transport, TransportConfig};
pub use websocket::WebSocketConnector;
