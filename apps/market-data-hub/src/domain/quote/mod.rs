//! Quote Types
//!
//! The canonical latest-value record for a symbol. A quote is produced by the
//! feed codec, flows once through the hub pipeline and is then retained only
//! as the cache's current value for its symbol. A newer quote always replaces
//! the previous one wholesale; quotes are never merged or diffed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string (stock ticker or OCC option symbol).
pub type Symbol = String;

/// Session statistics carried by feeds that publish them alongside the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session open price.
    pub open: Decimal,
    /// Session high price.
    pub high: Decimal,
    /// Session low price.
    pub low: Decimal,
    /// Previous session close.
    pub prev_close: Decimal,
}

/// Latest market update for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol (e.g., "AAPL").
    pub symbol: Symbol,
    /// Best bid price.
    pub bid: Decimal,
    /// Best bid size.
    pub bid_size: u64,
    /// Best ask price.
    pub ask: Decimal,
    /// Best ask size.
    pub ask_size: u64,
    /// Last traded (or mid) price.
    pub last: Decimal,
    /// Cumulative session volume, zero when the feed does not report it.
    pub volume: u64,
    /// Session statistics, when known.
    pub session: Option<SessionStats>,
    /// Exchange timestamp of the update.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Build a quote from top-of-book prices.
    ///
    /// The last price is set to the midpoint of bid and ask.
    #[must_use]
    pub fn from_book(
        symbol: impl Into<Symbol>,
        bid: Decimal,
        bid_size: u64,
        ask: Decimal,
        ask_size: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            bid_size,
            ask,
            ask_size,
            last: (bid + ask) / Decimal::TWO,
            volume: 0,
            session: None,
            timestamp,
        }
    }

    /// Attach session statistics.
    #[must_use]
    pub fn with_session(mut self, session: SessionStats) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the last price.
    #[must_use]
    pub const fn with_last(mut self, last: Decimal) -> Self {
        self.last = last;
        self
    }

    /// Set the cumulative volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: u64) -> Self {
        self.volume = volume;
        self
    }

    /// Midpoint between bid and ask.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Absolute change against the previous close, if session stats are known.
    #[must_use]
    pub fn change(&self) -> Option<Decimal> {
        self.session.as_ref().map(|s| self.last - s.prev_close)
    }

    /// Percentage change against the previous close.
    ///
    /// Returns `None` without session stats or when the previous close is zero.
    #[must_use]
    pub fn change_percent(&self) -> Option<Decimal> {
        let session = self.session.as_ref()?;
        if session.prev_close.is_zero() {
            return None;
        }
        Some((self.last - session.prev_close) / session.prev_close * Decimal::ONE_HUNDRED)
    }

    /// Whether the quote is at or above the previous close.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.change().is_some_and(|c| c >= Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn from_book_sets_mid_as_last() {
        let quote = Quote::from_book("AAPL", dec("150.00"), 100, dec("150.10"), 200, Utc::now());
        assert_eq!(quote.last, dec("150.05"));
        assert_eq!(quote.mid(), dec("150.05"));
        assert_eq!(quote.spread(), dec("0.10"));
        assert!(quote.session.is_none());
    }

    #[test]
    fn change_requires_session() {
        let quote = Quote::from_book("AAPL", dec("10"), 1, dec("10"), 1, Utc::now());
        assert_eq!(quote.change(), None);
        assert_eq!(quote.change_percent(), None);
        assert!(!quote.is_positive());
    }

    #[test]
    fn change_percent_against_prev_close() {
        let quote = Quote::from_book("MSFT", dec("109"), 1, dec("111"), 1, Utc::now())
            .with_session(SessionStats {
                open: dec("100"),
                high: dec("112"),
                low: dec("99"),
                prev_close: dec("100"),
            });

        assert_eq!(quote.change(), Some(dec("10")));
        assert_eq!(quote.change_percent(), Some(dec("10")));
        assert!(quote.is_positive());
    }

    #[test]
    fn zero_prev_close_has_no_percent() {
        let quote = Quote::from_book("X", dec("1"), 1, dec("1"), 1, Utc::now()).with_session(
            SessionStats {
                open: dec("0"),
                high: dec("0"),
                low: dec("0"),
                prev_close: Decimal::ZERO,
            },
        );
        assert_eq!(quote.change_percent(), None);
    }

    #[test]
    fn builders_replace_fields() {
        let quote = Quote::from_book("SPY", dec("1"), 1, dec("3"), 1, Utc::now())
            .with_last(dec("2.5"))
            .with_volume(1_000);
        assert_eq!(quote.last, dec("2.5"));
        assert_eq!(quote.volume, 1_000);
    }
}
