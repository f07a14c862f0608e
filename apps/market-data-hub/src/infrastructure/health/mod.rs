//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, hub status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (upstream connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{MarketDataHub, PipelineStats};
use crate::domain::streaming::ConnectionState;
use crate::infrastructure::metrics::{self, get_metrics_handle};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Hub version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream connection status.
    pub connection: ConnectionInfo,
    /// Subscription and cache figures.
    pub subscriptions: SubscriptionStatus,
    /// Pipeline counters.
    pub pipeline: PipelineStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream connected.
    Healthy,
    /// Connecting or reconnecting.
    Degraded,
    /// Disconnected.
    Unhealthy,
}

impl HealthStatus {
    /// Map a connection state to a health status.
    #[must_use]
    pub const fn from_connection_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => Self::Degraded,
            ConnectionState::Disconnected => Self::Unhealthy,
        }
    }
}

/// Upstream connection status.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Transport state name.
    pub state: &'static str,
    /// Whether the hub considers itself connected.
    pub connected: bool,
    /// Current reconnect attempt (0 unless reconnecting).
    pub reconnect_attempt: u32,
}

/// Subscription and cache figures.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Symbols in the subscription set.
    pub symbols: usize,
    /// Symbols in the visibility set.
    pub visible: usize,
    /// Cached quotes.
    pub cached_quotes: usize,
    /// Active update consumers.
    pub consumers: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    hub: Arc<MarketDataHub>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: impl Into<String>, hub: Arc<MarketDataHub>) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            hub,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Build the health router.
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.hub.connection_state().is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let hub = &state.hub;
    let connection_state = hub.connection_state();
    let reconnect_attempt = match connection_state {
        ConnectionState::Reconnecting { attempt } => attempt,
        _ => 0,
    };
    let consumers = hub.update_consumers();
    metrics::set_broadcast_receivers(consumers);

    HealthResponse {
        status: HealthStatus::from_connection_state(connection_state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection: ConnectionInfo {
            state: connection_state.as_str(),
            connected: hub.is_connected(),
            reconnect_attempt,
        },
        subscriptions: SubscriptionStatus {
            symbols: hub.subscriptions().len(),
            visible: hub.visible_symbols().len(),
            cached_quotes: hub.cache_size(),
            consumers,
        },
        pipeline: hub.stats(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
