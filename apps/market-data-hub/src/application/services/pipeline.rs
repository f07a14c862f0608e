//! Quote Pipeline
//!
//! The per-frame processing path shared by the hub's drain task and its read
//! accessors:
//!
//! ```text
//! frame ─► decode ─► should_process ─► cache.set ─► broadcast ─► record_update
//!                        │ (drop)
//!                        ▼
//!                    throttled
//! ```
//!
//! The cache and the admission controller each sit behind their own mutex.
//! Every step takes exactly one of them for one short critical section and
//! never holds both.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::application::ports::{FeedCodec, Frame};
use crate::domain::admission::AdmissionController;
use crate::domain::cache::QuoteCache;
use crate::domain::quote::{Quote, Symbol};
use crate::infrastructure::broadcast::{QuoteBroadcaster, QuoteSubscription};
use crate::infrastructure::metrics;

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Data frames taken from the inbound stream.
    pub frames_received: u64,
    /// Frames dropped because they failed to decode.
    pub decode_failures: u64,
    /// Quotes admitted, cached and broadcast.
    pub admitted: u64,
    /// Quotes dropped by the throttle.
    pub throttled: u64,
    /// Quotes skipped by lagging broadcast consumers.
    pub broadcast_lagged: u64,
}

#[derive(Debug, Default)]
struct PipelineCounters {
    frames_received: AtomicU64,
    decode_failures: AtomicU64,
    admitted: AtomicU64,
    throttled: AtomicU64,
}

/// Decode, admit, cache and broadcast quotes.
pub struct QuotePipeline {
    codec: Arc<dyn FeedCodec>,
    cache: Mutex<QuoteCache>,
    admission: Mutex<AdmissionController>,
    broadcaster: QuoteBroadcaster,
    counters: PipelineCounters,
}

impl std::fmt::Debug for QuotePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotePipeline")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl QuotePipeline {
    /// Assemble a pipeline from its stages.
    #[must_use]
    pub fn new(
        codec: Arc<dyn FeedCodec>,
        cache: QuoteCache,
        admission: AdmissionController,
        broadcaster: QuoteBroadcaster,
    ) -> Self {
        Self {
            codec,
            cache: Mutex::new(cache),
            admission: Mutex::new(admission),
            broadcaster,
            counters: PipelineCounters::default(),
        }
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Decode a frame and push each quote through admission.
    ///
    /// Undecodable frames are counted and dropped. Returns how many quotes
    /// were admitted.
    pub fn process_frame(&self, frame: &Frame) -> usize {
        let started = Instant::now();
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        metrics::record_frame_received();

        let quotes = match self.codec.decode(frame) {
            Ok(quotes) => quotes,
            Err(err) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_decode_failure();
                tracing::warn!(error = %err, frame_len = frame.len(), "Dropping undecodable frame");
                return 0;
            }
        };

        let admitted = quotes
            .into_iter()
            .map(|quote| self.process_quote(quote))
            .filter(|admitted| *admitted)
            .count();

        metrics::record_processing_duration(started.elapsed());
        admitted
    }

    /// Run one decoded quote through admission, cache and broadcast.
    ///
    /// Returns `true` if the quote was admitted.
    pub fn process_quote(&self, quote: Quote) -> bool {
        let symbol = quote.symbol.clone();

        let (admit, priority) = {
            let mut admission = self.admission.lock();
            let priority = admission.priority(&symbol);
            (admission.should_process(&quote), priority)
        };

        if !admit {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            metrics::record_throttled(priority);
            tracing::trace!(symbol = %symbol, tier = priority.as_str(), "Quote throttled");
            return false;
        }

        let cache_size = {
            let mut cache = self.cache.lock();
            if let Some(evicted) = cache.set(quote.clone()) {
                tracing::debug!(evicted = %evicted.symbol, "Evicted least recently used quote");
            }
            cache.size()
        };
        metrics::set_cache_entries(cache_size);

        let receivers = self.broadcaster.send(quote);

        self.admission.lock().record_update(&symbol);

        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        metrics::record_admitted(priority);
        tracing::trace!(symbol = %symbol, receivers, "Quote admitted");
        true
    }

    // =========================================================================
    // Cache Reads
    // =========================================================================

    /// Latest quote for a symbol; marks it most recently used.
    #[must_use]
    pub fn get_quote(&self, symbol: &str) -> Option<Quote> {
        self.cache.lock().get(symbol)
    }

    /// Latest quotes for the symbols that are cached. Recency is unchanged.
    #[must_use]
    pub fn get_quotes<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Quote> {
        self.cache.lock().get_multiple(symbols)
    }

    /// Every cached quote. Recency is unchanged.
    #[must_use]
    pub fn get_all_quotes(&self) -> Vec<Quote> {
        self.cache.lock().get_all()
    }

    /// Number of cached quotes.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.lock().size()
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Replace the visibility set.
    pub fn set_visible_symbols<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.admission.lock().set_visible_symbols(symbols);
    }

    /// Current visibility set, sorted.
    #[must_use]
    pub fn visible_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self.admission.lock().visible_symbols().into_iter().collect();
        symbols.sort_unstable();
        symbols
    }

    /// Completed update counts per symbol.
    #[must_use]
    pub fn update_stats(&self) -> std::collections::HashMap<Symbol, u64> {
        self.admission.lock().update_stats()
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Register a new broadcast consumer.
    #[must_use]
    pub fn subscribe(&self) -> QuoteSubscription {
        self.broadcaster.subscribe()
    }

    /// Number of active broadcast consumers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.broadcaster.receiver_count()
    }

    /// Snapshot of the pipeline counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            broadcast_lagged: self.broadcaster.lagged_total(),
        }
    }
}
