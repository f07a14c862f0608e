//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the ambient process services.

/// Upstream WebSocket transport, reconnect, heartbeat and JSON codec.
pub mod stream;

/// Broadcast channel adapter for quote fan-out.
pub mod broadcast;

/// Environment configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
