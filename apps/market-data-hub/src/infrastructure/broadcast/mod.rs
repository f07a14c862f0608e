//! Broadcast Channel Adapter
//!
//! Fans admitted quotes out to any number of in-process consumers over a
//! tokio broadcast channel.
//!
//! Each consumer has a bounded buffer. A consumer that falls behind loses the
//! oldest updates rather than slowing the producer; the number of skipped
//! updates is added to a shared lag counter and the consumer resumes with the
//! oldest update still buffered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::domain::quote::Quote;
use crate::infrastructure::metrics;

// =============================================================================
// Broadcaster
// =============================================================================

/// Producer side of the quote fan-out.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use market_data_hub::domain::quote::Quote;
/// use market_data_hub::infrastructure::broadcast::QuoteBroadcaster;
/// use rust_decimal::Decimal;
///
/// # tokio_test::block_on(async {
/// let broadcaster = QuoteBroadcaster::new(16);
/// let mut updates = broadcaster.subscribe();
///
/// let quote = Quote::from_book("AAPL", Decimal::ONE, 1, Decimal::TWO, 1, Utc::now());
/// assert_eq!(broadcaster.send(quote), 1);
/// assert_eq!(updates.recv().await.map(|q| q.symbol), Some("AAPL".to_string()));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct QuoteBroadcaster {
    tx: broadcast::Sender<Quote>,
    lagged: Arc<AtomicU64>,
}

impl QuoteBroadcaster {
    /// Create a broadcaster with the given per-consumer buffer size.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            lagged: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send a quote to every current consumer without waiting.
    ///
    /// Returns the number of consumers the quote was queued for (zero when
    /// nobody is listening).
    pub fn send(&self, quote: Quote) -> usize {
        self.tx.send(quote).unwrap_or(0)
    }

    /// Register a new consumer. It sees only quotes sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> QuoteSubscription {
        let subscription = QuoteSubscription {
            rx: self.tx.subscribe(),
            lagged: Arc::clone(&self.lagged),
        };
        metrics::set_broadcast_receivers(self.receiver_count());
        subscription
    }

    /// Number of active consumers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total updates skipped by lagging consumers.
    #[must_use]
    pub fn lagged_total(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Consumer side of the quote fan-out.
#[derive(Debug)]
pub struct QuoteSubscription {
    rx: broadcast::Receiver<Quote>,
    lagged: Arc<AtomicU64>,
}

impl QuoteSubscription {
    /// Wait for the next quote.
    ///
    /// Skips over any updates lost to lag. Returns `None` once the producer
    /// is gone.
    pub async fn recv(&mut self) -> Option<Quote> {
        loop {
            match self.rx.recv().await {
                Ok(quote) => return Some(quote),
                Err(RecvError::Lagged(skipped)) => record_lag(&self.lagged, skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered quote without waiting.
    ///
    /// Returns `None` when nothing is buffered or the producer is gone.
    pub fn try_recv(&mut self) -> Option<Quote> {
        use broadcast::error::TryRecvError;

        loop {
            match self.rx.try_recv() {
                Ok(quote) => return Some(quote),
                Err(TryRecvError::Lagged(skipped)) => record_lag(&self.lagged, skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream` of quotes with the same lag handling.
    pub fn into_stream(self) -> impl Stream<Item = Quote> + Send + 'static {
        let lagged = self.lagged;
        BroadcastStream::new(self.rx).filter_map(move |item| {
            let quote = match item {
                Ok(quote) => Some(quote),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    record_lag(&lagged, skipped);
                    None
                }
            };
            futures::future::ready(quote)
        })
    }
}

fn record_lag(counter: &AtomicU64, skipped: u64) {
    counter.fetch_add(skipped, Ordering::Relaxed);
    metrics::record_broadcast_lagged(skipped);
    tracing::warn!(skipped, "Broadcast consumer lagged, oldest updates dropped");
}

// =============================================================================
// Tests
// =============================================================================
