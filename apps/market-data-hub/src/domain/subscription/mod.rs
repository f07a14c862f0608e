//! Subscription Tracking
//!
//! Domain types for the set of symbols the hub has asked the upstream feed to
//! send. The set only changes through explicit subscribe/unsubscribe calls and
//! every change is reported as a [`SubscriptionChanges`] so the caller knows
//! exactly which control frames to forward upstream.
//!
//! The subscription set is independent from the visibility set used for
//! throttling: a symbol can be subscribed without being visible.

use std::collections::BTreeSet;

use crate::domain::quote::Symbol;

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to upstream subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols to subscribe to.
    pub subscribe: Vec<Symbol>,
    /// Symbols to unsubscribe from.
    pub unsubscribe: Vec<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().collect(),
            unsubscribe: Vec::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: Vec::new(),
            unsubscribe: symbols.into_iter().collect(),
        }
    }
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Symbols currently requested from the upstream feed.
///
/// Symbols are trimmed and blank entries ignored. Iteration order is sorted so
/// that replayed subscribe frames are deterministic.
///
/// # Example
///
/// ```rust
/// use market_data_hub::domain::subscription::SubscriptionSet;
///
/// let mut set = SubscriptionSet::new();
///
/// let changes = set.add(["AAPL", "MSFT"]);
/// assert_eq!(changes.subscribe, vec!["AAPL", "MSFT"]);
///
/// // Already subscribed - nothing to forward.
/// let changes = set.add(["AAPL"]);
/// assert!(changes.is_empty());
///
/// let changes = set.remove(["MSFT", "TSLA"]);
/// assert_eq!(changes.unsubscribe, vec!["MSFT"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    symbols: BTreeSet<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty subscription set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: BTreeSet::new(),
        }
    }

    /// Add symbols.
    ///
    /// Returns the symbols that were not already subscribed, in input order.
    pub fn add<I, S>(&mut self, symbols: I) -> SubscriptionChanges
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = symbols
            .into_iter()
            .filter_map(|s| normalize(s.as_ref()))
            .filter(|s| self.symbols.insert(s.clone()))
            .collect::<Vec<_>>();

        SubscriptionChanges::subscribe_only(added)
    }

    /// Remove symbols.
    ///
    /// Returns the symbols that were actually subscribed, in input order.
    pub fn remove<I, S>(&mut self, symbols: I) -> SubscriptionChanges
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed = symbols
            .into_iter()
            .filter_map(|s| normalize(s.as_ref()))
            .filter(|s| self.symbols.remove(s))
            .collect::<Vec<_>>();

        SubscriptionChanges::unsubscribe_only(removed)
    }

    /// Whether a symbol is subscribed.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// All subscribed symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn normalize(symbol: &str) -> Option<Symbol> {
    let trimmed = symbol.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// =============================================================================
// Tests
// =============================================================================
