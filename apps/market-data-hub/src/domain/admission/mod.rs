//! Admission Control
//!
//! Per-symbol rate limiting that bounds how often updates for a symbol reach
//! the cache and broadcast stages, independent of the upstream burst rate.
//!
//! Two throttle tiers apply:
//! - symbols in the visibility set: one update per `visible_interval` (100 ms)
//! - every other symbol: one update per `background_interval` (1000 ms)
//!
//! The first update for a symbol is always admitted since there is no
//! baseline to compare against.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use super::quote::{Quote, Symbol};

/// Throttle intervals for the two priority tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between admitted updates for visible symbols.
    pub visible_interval: Duration,
    /// Minimum spacing between admitted updates for all other symbols.
    pub background_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            visible_interval: Duration::from_millis(100),
            background_interval: Duration::from_millis(1000),
        }
    }
}

impl ThrottleConfig {
    /// Create a new configuration with custom intervals.
    #[must_use]
    pub const fn new(visible_interval: Duration, background_interval: Duration) -> Self {
        Self {
            visible_interval,
            background_interval,
        }
    }

    /// Create configuration from `ThrottleSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::ThrottleSettings) -> Self {
        Self {
            visible_interval: settings.visible_interval,
            background_interval: settings.background_interval,
        }
    }
}

/// Which throttle tier a symbol falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Symbol is in the visibility set.
    Visible,
    /// Symbol is subscribed but not visible.
    Background,
}

impl Priority {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Background => "background",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ThrottleRecord {
    last_admitted: Option<Instant>,
    update_count: u64,
}

/// Two-tier per-symbol admission controller.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use market_data_hub::domain::admission::{AdmissionController, ThrottleConfig};
/// use market_data_hub::domain::quote::Quote;
/// use rust_decimal::Decimal;
/// use std::time::Duration;
/// use tokio::time::Instant;
///
/// let mut controller = AdmissionController::new(ThrottleConfig::default());
/// controller.set_visible_symbols(["AAPL"]);
///
/// let quote = Quote::from_book("AAPL", Decimal::ONE, 1, Decimal::TWO, 1, Utc::now());
/// let t0 = Instant::now();
///
/// assert!(controller.should_process_at(&quote, t0));
/// assert!(!controller.should_process_at(&quote, t0 + Duration::from_millis(50)));
/// assert!(controller.should_process_at(&quote, t0 + Duration::from_millis(100)));
/// ```
#[derive(Debug, Default)]
pub struct AdmissionController {
    config: ThrottleConfig,
    visible: HashSet<Symbol>,
    records: HashMap<Symbol, ThrottleRecord>,
}

impl AdmissionController {
    /// Create a controller with the given throttle intervals.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            visible: HashSet::new(),
            records: HashMap::new(),
        }
    }

    /// Current throttle configuration.
    #[must_use]
    pub const fn config(&self) -> ThrottleConfig {
        self.config
    }

    /// Replace the visibility set.
    pub fn set_visible_symbols<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.visible = symbols.into_iter().map(Into::into).collect();
        tracing::debug!(visible = self.visible.len(), "Visibility set replaced");
    }

    /// Current visibility set.
    #[must_use]
    pub fn visible_symbols(&self) -> HashSet<Symbol> {
        self.visible.clone()
    }

    /// Whether a symbol is in the visibility set.
    #[must_use]
    pub fn is_visible(&self, symbol: &str) -> bool {
        self.visible.contains(symbol)
    }

    /// Throttle tier for a symbol.
    #[must_use]
    pub fn priority(&self, symbol: &str) -> Priority {
        if self.is_visible(symbol) {
            Priority::Visible
        } else {
            Priority::Background
        }
    }

    /// Minimum spacing that applies to a symbol right now.
    #[must_use]
    pub fn interval_for(&self, symbol: &str) -> Duration {
        match self.priority(symbol) {
            Priority::Visible => self.config.visible_interval,
            Priority::Background => self.config.background_interval,
        }
    }

    /// Decide whether an update should proceed downstream, using the current
    /// time.
    pub fn should_process(&mut self, quote: &Quote) -> bool {
        self.should_process_at(quote, Instant::now())
    }

    /// Decide whether an update should proceed downstream at `now`.
    ///
    /// Admits unconditionally when the symbol has no prior admission;
    /// otherwise admits only when at least the tier interval has elapsed
    /// since the last admitted update. The recorded timestamp only moves on
    /// admission, so dropped updates never extend the wait.
    pub fn should_process_at(&mut self, quote: &Quote, now: Instant) -> bool {
        let interval = self.interval_for(&quote.symbol);
        let record = self.records.entry(quote.symbol.clone()).or_default();

        let admit = record
            .last_admitted
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);

        if admit {
            record.last_admitted = Some(now);
        }
        admit
    }

    /// Count a completed update for statistics.
    ///
    /// Called after the update has been cached and broadcast; it plays no part
    /// in the admission decision.
    pub fn record_update(&mut self, symbol: &str) {
        if let Some(record) = self.records.get_mut(symbol) {
            record.update_count += 1;
        } else {
            self.records.insert(
                symbol.to_string(),
                ThrottleRecord {
                    last_admitted: None,
                    update_count: 1,
                },
            );
        }
    }

    /// Completed update counts per symbol.
    #[must_use]
    pub fn update_stats(&self) -> HashMap<Symbol, u64> {
        self.records
            .iter()
            .filter(|(_, r)| r.update_count > 0)
            .map(|(s, r)| (s.clone(), r.update_count))
            .collect()
    }

    /// Number of symbols with throttle state.
    #[must_use]
    pub fn tracked_symbols(&self) -> usize {
        self.records.len()
    }

    /// Forget all throttle records and counters. The visibility set is kept.
    pub fn reset(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;

    fn quote(symbol: &str) -> Quote {
        Quote::from_book(symbol, Decimal::ONE, 1, Decimal::TWO, 1, Utc::now())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn default_intervals() {
        let config = ThrottleConfig::default();
        assert_eq!(config.visible_interval, ms(100));
        assert_eq!(config.background_interval, ms(1000));
    }

    #[test]
    fn first_update_always_admitted() {
        let mut controller = AdmissionController::default();
        let t0 = Instant::now();

        for symbol in ["AAPL", "MSFT", "GOOG"] {
            assert!(controller.should_process_at(&quote(symbol), t0));
        }
        assert_eq!(controller.tracked_symbols(), 3);
    }

    #[test_case(true, 99, false ; "visible just under interval")]
    #[test_case(true, 100, true ; "visible at interval")]
    #[test_case(false, 100, false ; "background at visible interval")]
    #[test_case(false, 999, false ; "background just under interval")]
    #[test_case(false, 1000, true ; "background at interval")]
    fn second_update_threshold(visible: bool, elapsed_ms: u64, admitted: bool) {
        let mut controller = AdmissionController::new(ThrottleConfig::default());
        if visible {
            controller.set_visible_symbols(["AAPL"]);
        }
        let t0 = Instant::now();

        assert!(controller.should_process_at(&quote("AAPL"), t0));
        assert_eq!(
            controller.should_process_at(&quote("AAPL"), t0 + ms(elapsed_ms)),
            admitted
        );
    }

    #[test]
    fn rejected_updates_do_not_move_baseline() {
        let mut controller = AdmissionController::default();
        controller.set_visible_symbols(["AAPL"]);
        let t0 = Instant::now();
        let q = quote("AAPL");

        assert!(controller.should_process_at(&q, t0));
        assert!(!controller.should_process_at(&q, t0 + ms(60)));
        assert!(!controller.should_process_at(&q, t0 + ms(90)));
        // Measured from t0, not from the last rejection.
        assert!(controller.should_process_at(&q, t0 + ms(100)));
        assert!(!controller.should_process_at(&q, t0 + ms(150)));
        assert!(controller.should_process_at(&q, t0 + ms(200)));
    }

    #[test]
    fn symbols_are_throttled_independently() {
        let mut controller = AdmissionController::default();
        let t0 = Instant::now();

        assert!(controller.should_process_at(&quote("AAPL"), t0));
        assert!(controller.should_process_at(&quote("MSFT"), t0 + ms(10)));
        assert!(!controller.should_process_at(&quote("AAPL"), t0 + ms(20)));
    }

    #[test]
    fn visibility_change_applies_to_next_decision() {
        let mut controller = AdmissionController::default();
        let t0 = Instant::now();
        let q = quote("AAPL");

        assert!(controller.should_process_at(&q, t0));
        assert!(!controller.should_process_at(&q, t0 + ms(150)));

        controller.set_visible_symbols(["AAPL"]);
        assert!(controller.should_process_at(&q, t0 + ms(200)));
    }

    #[test]
    fn set_visible_symbols_replaces_previous_set() {
        let mut controller = AdmissionController::default();
        controller.set_visible_symbols(["AAPL", "MSFT"]);
        controller.set_visible_symbols(vec!["GOOG".to_string()]);

        assert!(!controller.is_visible("AAPL"));
        assert!(controller.is_visible("GOOG"));
        assert_eq!(controller.priority("AAPL"), Priority::Background);
        assert_eq!(controller.priority("GOOG"), Priority::Visible);
        assert_eq!(controller.visible_symbols().len(), 1);
    }

    #[test]
    fn record_update_counts_only() {
        let mut controller = AdmissionController::default();
        let t0 = Instant::now();
        let q = quote("AAPL");

        assert!(controller.should_process_at(&q, t0));
        controller.record_update("AAPL");
        controller.record_update("AAPL");

        assert_eq!(controller.update_stats().get("AAPL"), Some(&2));
        // Counting never admits anything.
        assert!(!controller.should_process_at(&q, t0 + ms(10)));
    }

    #[test]
    fn admitted_but_unrecorded_symbols_absent_from_stats() {
        let mut controller = AdmissionController::default();
        assert!(controller.should_process_at(&quote("AAPL"), Instant::now()));
        assert!(controller.update_stats().is_empty());
    }

    #[test]
    fn reset_forgets_records_and_keeps_visibility() {
        let mut controller = AdmissionController::default();
        controller.set_visible_symbols(["AAPL"]);
        let t0 = Instant::now();
        let q = quote("AAPL");

        assert!(controller.should_process_at(&q, t0));
        controller.record_update("AAPL");
        controller.reset();

        assert!(controller.update_stats().is_empty());
        assert!(controller.is_visible("AAPL"));
        assert!(controller.should_process_at(&q, t0 + ms(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_process_uses_runtime_clock() {
        let mut controller = AdmissionController::default();
        let q = quote("MSFT");

        assert!(controller.should_process(&q));
        tokio::time::advance(ms(500)).await;
        assert!(!controller.should_process(&q));
        tokio::time::advance(ms(500)).await;
        assert!(controller.should_process(&q));
    }
}
