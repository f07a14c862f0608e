#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Data Hub - Streaming Quote Distribution
//!
//! Holds a single resilient connection to a market data WebSocket feed,
//! throttles per-symbol update storms by visibility tier, keeps a bounded
//! LRU cache of the latest quote per symbol, and fans admitted quotes out to
//! any number of in-process consumers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and single-owner logic, no I/O
//!   - `quote`: Quote record and derived fields
//!   - `cache`: Bounded LRU latest-quote cache
//!   - `admission`: Two-tier per-symbol throttle
//!   - `streaming`: Connection lifecycle states
//!   - `subscription`: Subscription set tracking
//!
//! - **Application**: Services and port definitions
//!   - `ports`: `Connector` and `FeedCodec` interfaces
//!   - `services`: `QuotePipeline` and `MarketDataHub`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Transport, reconnect, heartbeat, WebSocket and JSON codec
//!   - `broadcast`: Quote fan-out
//!   - `config`: Environment configuration
//!   - `health`, `metrics`, `telemetry`: Operational surface
//!
//! # Data Flow
//!
//! ```text
//! Feed WS ─► Transport ─► inbound ─► decode ─► admission ─► cache ─► broadcast ─┬─► consumer 1
//!               ▲                                                               ├─► consumer 2
//!               └── subscribe / unsubscribe / resubscribe on reconnect          └─► consumer N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::admission::{AdmissionController, Priority, ThrottleConfig};
pub use domain::cache::QuoteCache;
pub use domain::quote::{Quote, SessionStats, Symbol};
pub use domain::streaming::ConnectionState;
pub use domain::subscription::{SubscriptionChanges, SubscriptionSet};

// Ports
pub use application::ports::{
    CodecError, Connection, Connector, FeedCodec, Frame, FrameSink, FrameStream, TransportError,
};

// Services
pub use application::services::{
    HubError, HubOptions, MarketDataHub, PipelineStats, QuotePipeline,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, CacheSettings, ConfigError, HubConfig, ServerSettings, StreamSettings,
    ThrottleSettings,
};

// Stream adapters
pub use infrastructure::stream::{
    JsonFeedCodec, ReconnectConfig, Transport, TransportConfig, WebSocketConnector,
};

// Broadcast
pub use infrastructure::broadcast::{QuoteBroadcaster, QuoteSubscription};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
