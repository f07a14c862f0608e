//! Market Data Hub
//!
//! Composition root and public control surface. The hub wires the transport's
//! inbound stream into the quote pipeline, owns the subscription set, and
//! keeps the upstream subscriptions in step with it across reconnects.
//!
//! # Tasks
//!
//! While connected the hub runs two tasks next to the transport's own:
//!
//! - **pipeline**: drains inbound frames through decode, admission, cache
//!   and broadcast, in arrival order
//! - **resubscriber**: watches connection state and replays the full
//!   subscription set after every successful reconnect
//!
//! `disconnect()` cancels both and waits for them to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pipeline::{PipelineStats, QuotePipeline};
use crate::HubConfig;
use crate::application::ports::{CodecError, Connector, FeedCodec, Frame, TransportError};
use crate::domain::admission::{AdmissionController, ThrottleConfig};
use crate::domain::cache::{DEFAULT_CACHE_CAPACITY, QuoteCache};
use crate::domain::quote::{Quote, Symbol};
use crate::domain::streaming::ConnectionState;
use crate::domain::subscription::{SubscriptionChanges, SubscriptionSet};
use crate::infrastructure::broadcast::{QuoteBroadcaster, QuoteSubscription};
use crate::infrastructure::metrics;
use crate::infrastructure::stream::{Transport, TransportConfig};

// =============================================================================
// Configuration and Errors
// =============================================================================

/// Hub construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HubOptions {
    /// Transport reconnect, heartbeat and buffering.
    pub transport: TransportConfig,
    /// Admission throttle intervals.
    pub throttle: ThrottleConfig,
    /// Maximum cached symbols.
    pub cache_capacity: usize,
    /// Per-consumer broadcast buffer.
    pub broadcast_capacity: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            throttle: ThrottleConfig::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            broadcast_capacity: 4096,
        }
    }
}

impl HubOptions {
    /// Build options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            transport: TransportConfig::from_stream_settings(&config.stream),
            throttle: ThrottleConfig::from_settings(&config.throttle),
            cache_capacity: config.cache.capacity,
            broadcast_capacity: config.broadcast.capacity,
        }
    }
}

/// Hub error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Control frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// =============================================================================
// Hub
// =============================================================================

struct RunningTasks {
    cancel: CancellationToken,
    pipeline: JoinHandle<()>,
    resubscriber: JoinHandle<()>,
}

impl RunningTasks {
    fn is_running(&self) -> bool {
        !self.pipeline.is_finished()
    }

    async fn stop(self) {
        self.cancel.cancel();
        for (name, handle) in [("pipeline", self.pipeline), ("resubscriber", self.resubscriber)] {
            if let Err(err) = handle.await {
                tracing::warn!(task = name, error = %err, "Hub task ended abnormally");
            }
        }
    }
}

/// Streaming market data hub.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use market_data_hub::{HubOptions, JsonFeedCodec, MarketDataHub, WebSocketConnector};
///
/// # async fn run() -> Result<(), market_data_hub::HubError> {
/// let hub = MarketDataHub::new(
///     Arc::new(WebSocketConnector::new("wss://stream.data.alpaca.markets/v2/iex")),
///     Arc::new(JsonFeedCodec::new()),
///     HubOptions::default(),
/// );
///
/// hub.connect().await?;
/// hub.subscribe(["AAPL", "MSFT"]).await?;
/// hub.set_visible_symbols(["AAPL"]);
///
/// let mut updates = hub.subscribe_updates();
/// while let Some(quote) = updates.recv().await {
///     println!("{} {}", quote.symbol, quote.last);
/// }
/// # Ok(())
/// # }
/// ```
pub struct MarketDataHub {
    transport: Arc<Transport>,
    codec: Arc<dyn FeedCodec>,
    pipeline: Arc<QuotePipeline>,
    subscriptions: Arc<parking_lot::Mutex<SubscriptionSet>>,
    connected: Arc<AtomicBool>,
    tasks: tokio::sync::Mutex<Option<RunningTasks>>,
}

impl std::fmt::Debug for MarketDataHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataHub")
            .field("state", &self.connection_state())
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}

impl MarketDataHub {
    /// Create a disconnected hub.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        codec: Arc<dyn FeedCodec>,
        options: HubOptions,
    ) -> Self {
        let pipeline = QuotePipeline::new(
            Arc::clone(&codec),
            QuoteCache::new(options.cache_capacity),
            AdmissionController::new(options.throttle),
            QuoteBroadcaster::new(options.broadcast_capacity),
        );

        Self {
            transport: Arc::new(Transport::new(connector, options.transport)),
            codec,
            pipeline: Arc::new(pipeline),
            subscriptions: Arc::new(parking_lot::Mutex::new(SubscriptionSet::new())),
            connected: Arc::new(AtomicBool::new(false)),
            tasks: tokio::sync::Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect upstream, start the pipeline and send the subscription set.
    ///
    /// Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Transport` if the initial connection fails.
    pub async fn connect(&self) -> Result<(), HubError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.as_ref().is_some_and(RunningTasks::is_running)
            && self.transport.state().is_active()
        {
            return Ok(());
        }

        if let Some(stale) = tasks.take() {
            stale.stop().await;
        }

        self.transport.connect().await?;
        let inbound = self
            .transport
            .take_inbound()
            .ok_or(HubError::Transport(TransportError::NotConnected))?;

        let cancel = CancellationToken::new();
        let state_rx = self.transport.watch_state();

        self.connected.store(true, Ordering::SeqCst);

        let pipeline = tokio::spawn(run_pipeline(
            Arc::clone(&self.pipeline),
            inbound,
            Arc::clone(&self.connected),
            cancel.clone(),
        ));
        let resubscriber = tokio::spawn(run_resubscriber(
            Arc::clone(&self.transport),
            Arc::clone(&self.codec),
            Arc::clone(&self.subscriptions),
            state_rx,
            cancel.clone(),
        ));

        *tasks = Some(RunningTasks {
            cancel,
            pipeline,
            resubscriber,
        });
        drop(tasks);

        tracing::info!("Market data hub connected");

        let symbols = self.subscriptions.lock().symbols();
        if !symbols.is_empty()
            && let Err(err) =
                send_subscription(&self.transport, self.codec.as_ref(), &symbols).await
        {
            tracing::warn!(error = %err, "Initial subscription send failed");
        }
        Ok(())
    }

    /// Stop the pipeline, close the connection and clear the connected flag.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn disconnect(&self) {
        let running = self.tasks.lock().await.take();
        if let Some(running) = running {
            running.cancel.cancel();
            self.transport.disconnect().await;
            running.stop().await;
            tracing::info!("Market data hub disconnected");
        } else {
            self.transport.disconnect().await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Add symbols to the subscription set and ask the feed for them.
    ///
    /// Only symbols not already subscribed are forwarded. While not connected
    /// the set is updated and the request is deferred until the next
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the control frame cannot be encoded or written.
    /// The subscription set is updated either way and will be replayed on
    /// reconnect.
    pub async fn subscribe<I, S>(&self, symbols: I) -> Result<SubscriptionChanges, HubError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let changes = {
            let mut set = self.subscriptions.lock();
            let changes = set.add(symbols);
            metrics::set_subscriptions(set.len());
            changes
        };

        if changes.subscribe.is_empty() {
            return Ok(changes);
        }
        if !self.transport.state().is_connected() {
            tracing::debug!(
                symbols = changes.subscribe.len(),
                "Not connected, subscribe deferred"
            );
            return Ok(changes);
        }

        send_subscription(&self.transport, self.codec.as_ref(), &changes.subscribe).await?;
        tracing::info!(symbols = ?changes.subscribe, "Subscribed");
        Ok(changes)
    }

    /// Remove symbols from the subscription set and tell the feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the control frame cannot be encoded or written.
    /// The subscription set is updated either way.
    pub async fn unsubscribe<I, S>(&self, symbols: I) -> Result<SubscriptionChanges, HubError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let changes = {
            let mut set = self.subscriptions.lock();
            let changes = set.remove(symbols);
            metrics::set_subscriptions(set.len());
            changes
        };

        if changes.unsubscribe.is_empty() || !self.transport.state().is_connected() {
            return Ok(changes);
        }

        let frame = self.codec.encode_unsubscribe(&changes.unsubscribe)?;
        self.transport.send(frame).await?;
        tracing::info!(symbols = ?changes.unsubscribe, "Unsubscribed");
        Ok(changes)
    }

    /// Current subscription set, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Symbol> {
        self.subscriptions.lock().symbols()
    }

    // =========================================================================
    // Visibility and Cache
    // =========================================================================

    /// Replace the set of symbols throttled at the visible rate.
    pub fn set_visible_symbols<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.pipeline.set_visible_symbols(symbols);
    }

    /// Current visibility set, sorted.
    #[must_use]
    pub fn visible_symbols(&self) -> Vec<Symbol> {
        self.pipeline.visible_symbols()
    }

    /// Latest quote for a symbol; marks it most recently used.
    #[must_use]
    pub fn get_quote(&self, symbol: &str) -> Option<Quote> {
        self.pipeline.get_quote(symbol)
    }

    /// Latest quotes for whichever of `symbols` are cached.
    #[must_use]
    pub fn get_quotes<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Quote> {
        self.pipeline.get_quotes(symbols)
    }

    /// Every cached quote, in no particular order.
    #[must_use]
    pub fn get_all_quotes(&self) -> Vec<Quote> {
        self.pipeline.get_all_quotes()
    }

    /// Number of cached quotes.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.pipeline.cache_size()
    }

    // =========================================================================
    // Output and Status
    // =========================================================================

    /// Register a consumer of admitted quotes.
    #[must_use]
    pub fn subscribe_updates(&self) -> QuoteSubscription {
        self.pipeline.subscribe()
    }

    /// Number of active update consumers.
    #[must_use]
    pub fn update_consumers(&self) -> usize {
        self.pipeline.receiver_count()
    }

    /// Current transport state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Watch transport state changes.
    #[must_use]
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.watch_state()
    }

    /// Whether the hub considers itself connected.
    ///
    /// Set by `connect()`. Cleared by `disconnect()`, or when the transport
    /// gives up reconnecting and the inbound stream ends.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Completed update counts per symbol.
    #[must_use]
    pub fn update_stats(&self) -> HashMap<Symbol, u64> {
        self.pipeline.update_stats()
    }

    /// Pipeline counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

async fn send_subscription(
    transport: &Transport,
    codec: &dyn FeedCodec,
    symbols: &[Symbol],
) -> Result<(), HubError> {
    let frame: Frame = codec.encode_subscribe(symbols)?;
    transport.send(frame).await?;
    Ok(())
}

async fn run_pipeline(
    pipeline: Arc<QuotePipeline>,
    mut inbound: mpsc::Receiver<Frame>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = inbound.recv() => frame,
        };

        let Some(frame) = frame else {
            if !cancel.is_cancelled() {
                connected.store(false, Ordering::SeqCst);
                tracing::warn!("Inbound stream ended, hub no longer connected");
            }
            break;
        };

        pipeline.process_frame(&frame);
    }
    tracing::debug!("Pipeline task stopped");
}

async fn run_resubscriber(
    transport: Arc<Transport>,
    codec: Arc<dyn FeedCodec>,
    subscriptions: Arc<parking_lot::Mutex<SubscriptionSet>>,
    mut state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut was_connected = true;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let state = *state_rx.borrow_and_update();
        let now_connected = state.is_connected();

        if now_connected && !was_connected {
            let symbols = subscriptions.lock().symbols();
            if !symbols.is_empty() {
                match send_subscription(&transport, codec.as_ref(), &symbols).await {
                    Ok(()) => tracing::info!(symbols = symbols.len(), "Subscriptions restored"),
                    Err(err) => tracing::warn!(error = %err, "Failed to restore subscriptions"),
                }
            }
        }
        was_connected = now_connected;
    }
    tracing::debug!("Resubscribe task stopped");
}
