//! Latest-Quote Cache
//!
//! Bounded map from symbol to its most recent quote with least-recently-used
//! eviction.
//!
//! # Design
//!
//! Entries live in a slot vector threaded by an intrusive doubly linked list
//! ordered by recency (head = most recent, tail = least recent). A hash index
//! maps symbols to slots, so `set` and `get` are O(1). Once the cache is full
//! the evicted tail slot is reused for the incoming symbol, so the slot vector
//! never grows past `capacity`.
//!
//! Only `set` and `get` touch recency. `get_multiple` and `get_all` are plain
//! reads and leave the eviction order untouched.

use std::collections::HashMap;

use super::quote::{Quote, Symbol};

/// Default number of symbols retained.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Slot {
    quote: Quote,
    prev: usize,
    next: usize,
}

/// LRU cache of the latest quote per symbol.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use market_data_hub::domain::cache::QuoteCache;
/// use market_data_hub::domain::quote::Quote;
/// use rust_decimal::Decimal;
///
/// let mut cache = QuoteCache::new(2);
/// let q = |s: &str| Quote::from_book(s, Decimal::ONE, 1, Decimal::TWO, 1, Utc::now());
///
/// cache.set(q("AAPL"));
/// cache.set(q("MSFT"));
/// cache.get("AAPL");
/// let evicted = cache.set(q("GOOG"));
///
/// assert_eq!(evicted.map(|e| e.symbol), Some("MSFT".to_string()));
/// assert!(cache.contains("AAPL"));
/// assert!(cache.contains("GOOG"));
/// ```
#[derive(Debug)]
pub struct QuoteCache {
    capacity: usize,
    index: HashMap<Symbol, usize>,
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl QuoteCache {
    /// Create an empty cache holding at most `capacity` symbols.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether a symbol is cached. Does not touch recency.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.index.contains_key(symbol)
    }

    /// Insert or replace the quote for its symbol and mark it most recent.
    ///
    /// When the symbol is new and the cache is full, the least recently
    /// touched entry is evicted first and returned.
    pub fn set(&mut self, quote: Quote) -> Option<Quote> {
        if let Some(&slot) = self.index.get(&quote.symbol) {
            self.slots[slot].quote = quote;
            self.move_to_front(slot);
            return None;
        }

        if self.index.len() >= self.capacity {
            let slot = self.tail;
            self.unlink(slot);
            self.index.insert(quote.symbol.clone(), slot);
            let evicted = std::mem::replace(&mut self.slots[slot].quote, quote);
            self.index.remove(&evicted.symbol);
            self.push_front(slot);
            return Some(evicted);
        }

        let slot = self.slots.len();
        self.index.insert(quote.symbol.clone(), slot);
        self.slots.push(Slot {
            quote,
            prev: NIL,
            next: NIL,
        });
        self.push_front(slot);
        None
    }

    /// Look up a symbol and mark it most recent.
    ///
    /// Absent symbols return `None` and leave the cache unchanged.
    pub fn get(&mut self, symbol: &str) -> Option<Quote> {
        let slot = *self.index.get(symbol)?;
        self.move_to_front(slot);
        Some(self.slots[slot].quote.clone())
    }

    /// Batch lookup that silently omits missing symbols.
    ///
    /// Unlike [`get`](Self::get) this does not update recency.
    #[must_use]
    pub fn get_multiple<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Quote> {
        symbols
            .iter()
            .filter_map(|s| self.index.get(s.as_ref()))
            .map(|&slot| self.slots[slot].quote.clone())
            .collect()
    }

    /// All cached quotes in unspecified order. Does not update recency.
    #[must_use]
    pub fn get_all(&self) -> Vec<Quote> {
        self.index
            .values()
            .map(|&slot| self.slots[slot].quote.clone())
            .collect()
    }

    /// Symbols ordered from most to least recently touched.
    #[must_use]
    pub fn symbols_by_recency(&self) -> Vec<Symbol> {
        let mut symbols = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while cursor != NIL {
            let slot = &self.slots[cursor];
            symbols.push(slot.quote.symbol.clone());
            cursor = slot.next;
        }
        symbols
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);

        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }

        self.slots[slot].prev = NIL;
        self.slots[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = NIL;
        self.slots[slot].next = self.head;

        if self.head == NIL {
            self.tail = slot;
        } else {
            self.slots[self.head].prev = slot;
        }
        self.head = slot;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::*;

    fn quote(symbol: &str) -> Quote {
        Quote::from_book(symbol, Decimal::ONE, 1, Decimal::TWO, 1, Utc::now())
    }

    fn quote_with_last(symbol: &str, last: i64) -> Quote {
        quote(symbol).with_last(Decimal::from(last))
    }

    #[test]
    fn set_and_get() {
        let mut cache = QuoteCache::new(4);
        assert!(cache.is_empty());

        cache.set(quote("AAPL"));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("AAPL").unwrap().symbol, "AAPL");
        assert!(cache.get("MSFT").is_none());
    }

    #[test]
    fn set_replaces_existing_entry_wholesale() {
        let mut cache = QuoteCache::new(4);
        cache.set(quote_with_last("AAPL", 1));
        let evicted = cache.set(quote_with_last("AAPL", 2));

        assert!(evicted.is_none());
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("AAPL").unwrap().last, Decimal::from(2));
    }

    #[test]
    fn get_touches_recency() {
        // capacity 2: AAPL, MSFT, get(AAPL), GOOG -> MSFT evicted
        let mut cache = QuoteCache::new(2);
        cache.set(quote("AAPL"));
        cache.set(quote("MSFT"));
        assert!(cache.get("AAPL").is_some());

        let evicted = cache.set(quote("GOOG"));

        assert_eq!(evicted.unwrap().symbol, "MSFT");
        assert_eq!(cache.size(), 2);
        assert!(cache.contains("AAPL"));
        assert!(cache.contains("GOOG"));
        assert!(!cache.contains("MSFT"));
    }

    #[test]
    fn set_touches_recency() {
        let mut cache = QuoteCache::new(2);
        cache.set(quote("AAPL"));
        cache.set(quote("MSFT"));
        cache.set(quote("AAPL"));

        let evicted = cache.set(quote("GOOG"));
        assert_eq!(evicted.unwrap().symbol, "MSFT");
    }

    #[test]
    fn get_multiple_does_not_touch_recency() {
        let mut cache = QuoteCache::new(2);
        cache.set(quote("AAPL"));
        cache.set(quote("MSFT"));

        let found = cache.get_multiple(&["AAPL", "NOPE"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbol, "AAPL");

        // AAPL is still least recent, so it is the one evicted.
        let evicted = cache.set(quote("GOOG"));
        assert_eq!(evicted.unwrap().symbol, "AAPL");
    }

    #[test]
    fn get_all_does_not_touch_recency() {
        let mut cache = QuoteCache::new(2);
        cache.set(quote("AAPL"));
        cache.set(quote("MSFT"));

        assert_eq!(cache.get_all().len(), 2);
        assert_eq!(cache.symbols_by_recency(), vec!["MSFT", "AAPL"]);

        let evicted = cache.set(quote("GOOG"));
        assert_eq!(evicted.unwrap().symbol, "AAPL");
    }

    #[test]
    fn get_missing_symbol_has_no_effect() {
        let mut cache = QuoteCache::new(2);
        cache.set(quote("AAPL"));
        cache.set(quote("MSFT"));
        let before = cache.symbols_by_recency();

        assert!(cache.get("TSLA").is_none());
        assert_eq!(cache.symbols_by_recency(), before);
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = QuoteCache::new(3);
        cache.set(quote("AAPL"));
        cache.set(quote("MSFT"));
        cache.clear();

        assert_eq!(cache.size(), 0);
        assert!(cache.get_all().is_empty());
        assert!(cache.symbols_by_recency().is_empty());

        cache.set(quote("GOOG"));
        assert_eq!(cache.symbols_by_recency(), vec!["GOOG"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = QuoteCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set(quote("AAPL"));
        let evicted = cache.set(quote("MSFT"));
        assert_eq!(evicted.unwrap().symbol, "AAPL");
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn default_capacity() {
        assert_eq!(QuoteCache::default().capacity(), DEFAULT_CACHE_CAPACITY);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8),
        Get(u8),
        GetMultiple(Vec<u8>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12).prop_map(Op::Set),
            (0u8..12).prop_map(Op::Get),
            prop::collection::vec(0u8..12, 0..4).prop_map(Op::GetMultiple),
        ]
    }

    proptest! {
        #[test]
        fn matches_reference_lru(capacity in 1usize..6, ops in prop::collection::vec(op_strategy(), 0..200)) {
            let mut cache = QuoteCache::new(capacity);
            // Reference model: front = most recent.
            let mut model: VecDeque<String> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Set(n) => {
                        let symbol = format!("S{n}");
                        let evicted = cache.set(quote(&symbol));
                        let expected = if let Some(pos) = model.iter().position(|s| *s == symbol) {
                            model.remove(pos);
                            None
                        } else if model.len() >= capacity {
                            model.pop_back()
                        } else {
                            None
                        };
                        model.push_front(symbol);
                        prop_assert_eq!(evicted.map(|q| q.symbol), expected);
                    }
                    Op::Get(n) => {
                        let symbol = format!("S{n}");
                        let hit = cache.get(&symbol);
                        if let Some(pos) = model.iter().position(|s| *s == symbol) {
                            model.remove(pos);
                            model.push_front(symbol);
                            prop_assert!(hit.is_some());
                        } else {
                            prop_assert!(hit.is_none());
                        }
                    }
                    Op::GetMultiple(ns) => {
                        let symbols: Vec<String> = ns.iter().map(|n| format!("S{n}")).collect();
                        let found = cache.get_multiple(&symbols);
                        let expected = symbols.iter().filter(|s| model.contains(s)).count();
                        prop_assert_eq!(found.len(), expected);
                    }
                }

                prop_assert!(cache.size() <= capacity);
                prop_assert_eq!(cache.symbols_by_recency(), model.iter().cloned().collect::<Vec<_>>());
            }
        }
    }
}
