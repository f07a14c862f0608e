//! Application Layer - Hub services and port definitions.
//!
//! This layer contains the quote pipeline, the hub that drives it, and the
//! port interfaces through which both reach the upstream feed.

/// Port interfaces for external systems (connector, feed codec).
pub mod ports;

/// Quote pipeline and market data hub services.
pub mod services;
