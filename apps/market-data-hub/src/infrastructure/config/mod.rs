//! Configuration Module
//!
//! Configuration loading for the market data hub.

mod settings;

pub use settings::{
    BroadcastSettings, CacheSettings, ConfigError, HubConfig, ServerSettings, StreamSettings,
    ThrottleSettings,
};
