//! Domain Layer - Core market data types and logic.
//!
//! This layer contains the quote model and the single-owner components the hub
//! pipeline drives: the latest-quote cache and the admission controller. None
//! of it performs I/O.

/// Quote record and symbol types.
pub mod quote;

/// Bounded LRU latest-quote cache.
pub mod cache;

/// Two-tier per-symbol admission control.
pub mod admission;

/// Connection lifecycle states.
pub mod streaming;

/// Subscription set tracking.
pub mod subscription;
