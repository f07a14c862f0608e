//! Prometheus Metrics Module
//!
//! Exposes hub metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Pipeline**: frames received, decode failures, admitted and throttled
//!   updates by tier, processing latency
//! - **Broadcast**: updates skipped by lagging consumers, receiver count
//! - **Connection**: state gauge, reconnect attempts
//! - **Cache / Subscriptions**: entry and symbol counts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::admission::Priority;
use crate::domain::streaming::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder is already registered).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "market_hub_frames_received_total",
        "Data frames received from the upstream feed"
    );
    describe_counter!(
        "market_hub_decode_failures_total",
        "Frames dropped because they could not be decoded"
    );
    describe_counter!(
        "market_hub_updates_admitted_total",
        "Quote updates admitted by the throttle, by tier"
    );
    describe_counter!(
        "market_hub_updates_throttled_total",
        "Quote updates dropped by the throttle, by tier"
    );
    describe_counter!(
        "market_hub_broadcast_lagged_total",
        "Updates skipped by lagging broadcast consumers"
    );
    describe_counter!(
        "market_hub_reconnects_total",
        "Upstream reconnection attempts"
    );

    describe_gauge!(
        "market_hub_connection_state",
        "Upstream connection state (0=disconnected 1=connecting 2=connected 3=reconnecting)"
    );
    describe_gauge!("market_hub_cache_entries", "Quotes held in the LRU cache");
    describe_gauge!(
        "market_hub_subscriptions",
        "Symbols subscribed on the upstream feed"
    );
    describe_gauge!(
        "market_hub_broadcast_receivers",
        "Active broadcast consumers"
    );

    describe_histogram!(
        "market_hub_frame_processing_seconds",
        "Time from frame receipt to broadcast of its quotes"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a data frame received from upstream.
pub fn record_frame_received() {
    counter!("market_hub_frames_received_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_failure() {
    counter!("market_hub_decode_failures_total").increment(1);
}

/// Record an admitted update.
pub fn record_admitted(priority: Priority) {
    counter!("market_hub_updates_admitted_total", "tier" => priority.as_str()).increment(1);
}

/// Record a throttled update.
pub fn record_throttled(priority: Priority) {
    counter!("market_hub_updates_throttled_total", "tier" => priority.as_str()).increment(1);
}

/// Record updates skipped by a lagging consumer.
pub fn record_broadcast_lagged(count: u64) {
    counter!("market_hub_broadcast_lagged_total").increment(count);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("market_hub_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("market_hub_connection_state").set(state.as_gauge());
}

/// Update the cache entry gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_cache_entries(count: usize) {
    gauge!("market_hub_cache_entries").set(count as f64);
}

/// Update the subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("market_hub_subscriptions").set(count as f64);
}

/// Update the broadcast receiver gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_broadcast_receivers(count: usize) {
    gauge!("market_hub_broadcast_receivers").set(count as f64);
}

/// Record frame processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("market_hub_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
