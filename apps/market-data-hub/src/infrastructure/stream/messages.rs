//! Feed Wire Messages
//!
//! Serde types for the Alpaca v2 market data WebSocket protocol. Every
//! inbound message carries a `"T"` discriminator; the feed batches messages
//! into JSON arrays.
//!
//! Only quotes feed the hub. Control messages are decoded so they can be
//! logged; other data types (trades, bars, statuses) are skipped by the
//! codec without being parsed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Quote, Symbol};

// =============================================================================
// Control Messages
// =============================================================================

/// Connection or authentication acknowledgement.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Acknowledgement text, e.g. "connected" or "authenticated".
    pub msg: String,
}

/// Error reported by the feed.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 405, "msg": "symbol limit exceeded"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: i32,
    /// Error description.
    pub msg: String,
}

impl ErrorMessage {
    /// Codes 401-404: authentication problems.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401..=404)
    }

    /// Codes 405-407: symbol, connection or slow-client limits.
    #[must_use]
    pub const fn is_limit_error(&self) -> bool {
        matches!(self.code, 405..=407)
    }
}

/// Active subscriptions after a subscribe/unsubscribe action.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "trades": [], "quotes": ["AAPL", "MSFT"], "bars": []}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Subscribed quote symbols.
    #[serde(default)]
    pub quotes: Vec<Symbol>,
    /// Subscribed trade symbols.
    #[serde(default)]
    pub trades: Vec<Symbol>,
    /// Subscribed bar symbols.
    #[serde(default)]
    pub bars: Vec<Symbol>,
}

// =============================================================================
// Quote Message
// =============================================================================

/// Real-time stock quote (NBBO).
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "q",
///   "S": "AMD",
///   "bx": "U",
///   "bp": 87.66,
///   "bs": 1,
///   "ax": "Q",
///   "ap": 87.68,
///   "as": 4,
///   "t": "2021-02-22T15:51:45.335689322Z",
///   "c": ["R"],
///   "z": "C"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteMessage {
    /// Ticker symbol.
    #[serde(rename = "S")]
    pub symbol: Symbol,

    /// Bid exchange code.
    #[serde(rename = "bx", default)]
    pub bid_exchange: String,

    /// Bid price.
    #[serde(rename = "bp")]
    pub bid_price: Decimal,

    /// Bid size in round lots.
    #[serde(rename = "bs")]
    pub bid_size: u64,

    /// Ask exchange code.
    #[serde(rename = "ax", default)]
    pub ask_exchange: String,

    /// Ask price.
    #[serde(rename = "ap")]
    pub ask_price: Decimal,

    /// Ask size in round lots.
    #[serde(rename = "as")]
    pub ask_size: u64,

    /// Quote timestamp (RFC-3339, nanosecond precision).
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    /// Quote condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape: "A" (NYSE), "B" (regional), "C" (NASDAQ).
    #[serde(rename = "z", default)]
    pub tape: String,
}

impl From<QuoteMessage> for Quote {
    fn from(msg: QuoteMessage) -> Self {
        Self::from_book(
            msg.symbol,
            msg.bid_price,
            msg.bid_size,
            msg.ask_price,
            msg.ask_size,
            msg.timestamp,
        )
    }
}

// =============================================================================
// Inbound Envelope
// =============================================================================

/// Inbound message, tagged by `"T"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "T")]
pub enum FeedMessage {
    /// Connection/authentication acknowledgement.
    #[serde(rename = "success")]
    Success(SuccessMessage),
    /// Feed error.
    #[serde(rename = "error")]
    Error(ErrorMessage),
    /// Subscription confirmation.
    #[serde(rename = "subscription")]
    Subscription(SubscriptionMessage),
    /// Stock quote.
    #[serde(rename = "q")]
    Quote(QuoteMessage),
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Subscribe/unsubscribe request.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "quotes": ["AAPL", "MSFT"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// "subscribe" or "unsubscribe".
    pub action: &'static str,

    /// Quote symbols.
    pub quotes: Vec<Symbol>,
}

impl SubscriptionRequest {
    /// Create a quote subscribe request.
    #[must_use]
    pub fn subscribe(quotes: &[Symbol]) -> Self {
        Self {
            action: "subscribe",
            quotes: quotes.to_vec(),
        }
    }

    /// Create a quote unsubscribe request.
    #[must_use]
    pub fn unsubscribe(quotes: &[Symbol]) -> Self {
        Self {
            action: "unsubscribe",
            quotes: quotes.to_vec(),
        }
    }
}
