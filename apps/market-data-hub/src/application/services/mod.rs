//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `QuotePipeline`: decode, admit, cache and broadcast inbound quotes
//! - `MarketDataHub`: connection lifecycle, subscriptions and read surface

mod market_data_hub;
mod pipeline;

pub use market_data_hub::{HubError, HubOptions, MarketDataHub};
pub use pipeline::{PipelineStats, QuotePipeline};
