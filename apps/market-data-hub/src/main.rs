//! Market Data Hub Binary
//!
//! Connects to the configured feed, subscribes to the configured symbols and
//! serves health and metrics until shut down.
//!
//! # Usage
//!
//! ```bash
//! MARKET_HUB_STREAM_URL=wss://stream.data.alpaca.markets/v2/iex \
//! MARKET_HUB_SYMBOLS=AAPL,MSFT \
//! cargo run --bin market-data-hub
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_HUB_STREAM_URL`: Upstream WebSocket URL
//!
//! ## Optional
//! - `MARKET_HUB_SYMBOLS`: Comma separated symbols to subscribe at startup
//! - `MARKET_HUB_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `MARKET_HUB_*`: Heartbeat, reconnect, throttle and capacity tuning
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-data-hub)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use futures::StreamExt;
use market_data_hub::infrastructure::health::{HealthServer, HealthServerState};
use market_data_hub::infrastructure::telemetry;
use market_data_hub::{
    HubConfig, HubOptions, JsonFeedCodec, MarketDataHub, QuoteSubscription, WebSocketConnector,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialise telemetry")?;

    tracing::info!("Starting Market Data Hub");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = HubConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let hub = Arc::new(MarketDataHub::new(
        Arc::new(WebSocketConnector::new(config.stream.url.clone())),
        Arc::new(JsonFeedCodec::new()),
        HubOptions::from_config(&config),
    ));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION"),
        Arc::clone(&hub),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let quote_logger = tokio::spawn(log_quotes(hub.subscribe_updates(), shutdown_token.clone()));

    hub.connect()
        .await
        .context("failed to connect to upstream feed")?;

    if !config.stream.symbols.is_empty() {
        let changes = hub
            .subscribe(&config.stream.symbols)
            .await
            .context("failed to subscribe to configured symbols")?;
        tracing::info!(symbols = changes.subscribe.len(), "Initial subscriptions sent");
    }

    tracing::info!("Market data hub ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        hub.disconnect().await;
        let _ = quote_logger.await;
        let _ = health_task.await;
    })
    .await
    .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("Market data hub stopped");
    Ok(())
}

/// Log every admitted quote at debug level.
async fn log_quotes(updates: QuoteSubscription, cancel: CancellationToken) {
    let mut quotes = std::pin::pin!(updates.into_stream().take_until(cancel.cancelled_owned()));
    while let Some(quote) = quotes.next().await {
        tracing::debug!(
            symbol = %quote.symbol,
            bid = %quote.bid,
            ask = %quote.ask,
            last = %quote.last,
            "Quote"
        );
    }
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        symbols = config.stream.symbols.len(),
        health_port = config.server.health_port,
        cache_capacity = config.cache.capacity,
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        "Configuration loaded"
    );
    tracing::debug!(stream_url = %config.stream.url, "Upstream endpoint");
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
