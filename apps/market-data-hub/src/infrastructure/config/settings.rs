//! Hub Configuration Settings
//!
//! Configuration types for the market data hub, loaded from environment
//! variables. Every setting except the stream URL has a default, and
//! unparseable values fall back to the default. Values that parse but would
//! stall the transport (zero intervals, non-finite factors) are rejected.

use std::time::Duration;

use crate::domain::quote::Symbol;

const ENV_PREFIX: &str = "MARKET_HUB_";

/// Upstream stream connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint URL.
    pub url: String,
    /// Symbols to subscribe to on startup.
    pub symbols: Vec<Symbol>,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Time without inbound traffic before a pinged connection is dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to reconnection delays (0 = none).
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Capacity of the inbound frame channel.
    pub inbound_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            symbols: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(16),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 10,
            inbound_capacity: 1024,
        }
    }
}

/// Admission throttle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Minimum spacing between updates for visible symbols.
    pub visible_interval: Duration,
    /// Minimum spacing between updates for background symbols.
    pub background_interval: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            visible_interval: Duration::from_millis(100),
            background_interval: Duration::from_millis(1000),
        }
    }
}

/// Quote cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Maximum number of cached symbols.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Per-consumer buffer size before the oldest updates are dropped.
    pub capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Upstream stream settings.
    pub stream: StreamSettings,
    /// Admission throttle settings.
    pub throttle: ThrottleSettings,
    /// Cache settings.
    pub cache: CacheSettings,
    /// Broadcast settings.
    pub broadcast: BroadcastSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_HUB_STREAM_URL` is missing or empty, or if
    /// a value is out of range: a zero capacity, heartbeat interval, heartbeat
    /// timeout or maximum reconnect delay, a multiplier below 1 or a negative
    /// jitter (non-finite factors included).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// `lookup` receives full variable names (including the `MARKET_HUB_`
    /// prefix) and returns `None` when a variable is unset.
    ///
    /// # Errors
    ///
    /// Same as [`HubConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let url = env
            .raw("STREAM_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar(env.key("STREAM_URL")))?;
        if url.trim().is_empty() {
            return Err(ConfigError::EmptyValue(env.key("STREAM_URL")));
        }

        let symbols = env
            .raw("SYMBOLS")
            .map(|raw| parse_symbol_list(&raw))
            .unwrap_or_default();

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            url: url.trim().to_string(),
            symbols,
            heartbeat_interval: env
                .nonzero_duration_secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?,
            heartbeat_timeout: env
                .nonzero_duration_secs("HEARTBEAT_TIMEOUT_SECS", defaults.heartbeat_timeout)?,
            reconnect_delay_initial: env.duration_millis(
                "RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env
                .nonzero_duration_secs("RECONNECT_DELAY_MAX_SECS", defaults.reconnect_delay_max)?,
            reconnect_delay_multiplier: env.factor(
                "RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
                1.0,
            )?,
            reconnect_jitter: env.factor("RECONNECT_JITTER", defaults.reconnect_jitter, 0.0)?,
            max_reconnect_attempts: env
                .parse("MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts),
            inbound_capacity: env.capacity("INBOUND_CAPACITY", defaults.inbound_capacity)?,
        };

        let throttle_defaults = ThrottleSettings::default();
        let throttle = ThrottleSettings {
            visible_interval: env
                .duration_millis("VISIBLE_THROTTLE_MS", throttle_defaults.visible_interval),
            background_interval: env.duration_millis(
                "BACKGROUND_THROTTLE_MS",
                throttle_defaults.background_interval,
            ),
        };

        let cache = CacheSettings {
            capacity: env.capacity("CACHE_CAPACITY", CacheSettings::default().capacity)?,
        };

        let broadcast = BroadcastSettings {
            capacity: env.capacity("BROADCAST_CAPACITY", BroadcastSettings::default().capacity)?,
        };

        let server = ServerSettings {
            health_port: env.parse("HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            stream,
            throttle,
            cache,
            broadcast,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value outside its allowed range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn key(&self, name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.key(name))
    }

    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> T {
        self.raw(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, name: &str, default: Duration) -> Duration {
        self.raw(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, name: &str, default: Duration) -> Duration {
        self.raw(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn capacity(&self, name: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parse(name, default);
        if value == 0 {
            return Err(self.invalid(name, "capacity must be greater than zero"));
        }
        Ok(value)
    }

    fn nonzero_duration_secs(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        let value = self.duration_secs(name, default);
        if value.is_zero() {
            return Err(self.invalid(name, "duration must be greater than zero"));
        }
        Ok(value)
    }

    /// A finite floating point factor no smaller than `min`.
    fn factor(&self, name: &str, default: f64, min: f64) -> Result<f64, ConfigError> {
        let value: f64 = self.parse(name, default);
        if !value.is_finite() {
            return Err(self.invalid(name, "value must be a finite number"));
        }
        if value < min {
            return Err(self.invalid(name, &format!("value must be at least {min}")));
        }
        Ok(value)
    }

    fn invalid(&self, name: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.key(name),
            reason: reason.to_string(),
        }
    }
}

fn parse_symbol_list(raw: &str) -> Vec<Symbol> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<HubConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        HubConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn stream_settings_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(settings.reconnect_delay_initial, Duration::from_secs(1));
        assert_eq!(settings.reconnect_delay_max, Duration::from_secs(16));
        assert!((settings.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_reconnect_attempts, 10);
    }

    #[test]
    fn other_settings_defaults() {
        assert_eq!(CacheSettings::default().capacity, 1000);
        assert_eq!(BroadcastSettings::default().capacity, 4096);
        assert_eq!(ServerSettings::default().health_port, 8083);
        assert_eq!(
            ThrottleSettings::default().visible_interval,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "MARKET_HUB_STREAM_URL"));
    }

    #[test]
    fn blank_url_is_an_error() {
        let err = config_from(&[("MARKET_HUB_STREAM_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = config_from(&[("MARKET_HUB_STREAM_URL", "wss://example.test/v2/iex")]).unwrap();
        assert_eq!(config.stream.url, "wss://example.test/v2/iex");
        assert!(config.stream.symbols.is_empty());
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.throttle, ThrottleSettings::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("MARKET_HUB_STREAM_URL", "wss://example.test"),
            ("MARKET_HUB_SYMBOLS", "aapl, MSFT,,goog "),
            ("MARKET_HUB_HEARTBEAT_INTERVAL_SECS", "5"),
            ("MARKET_HUB_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("MARKET_HUB_MAX_RECONNECT_ATTEMPTS", "0"),
            ("MARKET_HUB_VISIBLE_THROTTLE_MS", "50"),
            ("MARKET_HUB_CACHE_CAPACITY", "20"),
            ("MARKET_HUB_HEALTH_PORT", "9000"),
        ])
        .unwrap();

        assert_eq!(config.stream.symbols, vec!["AAPL", "MSFT", "GOOG"]);
        assert_eq!(config.stream.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(
            config.stream.reconnect_delay_initial,
            Duration::from_millis(250)
        );
        assert_eq!(config.stream.max_reconnect_attempts, 0);
        assert_eq!(config.throttle.visible_interval, Duration::from_millis(50));
        assert_eq!(config.cache.capacity, 20);
        assert_eq!(config.server.health_port, 9000);
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("MARKET_HUB_STREAM_URL", "wss://example.test"),
            ("MARKET_HUB_HEALTH_PORT", "not-a-port"),
            ("MARKET_HUB_RECONNECT_DELAY_MULTIPLIER", "fast"),
        ])
        .unwrap();

        assert_eq!(config.server.health_port, 8083);
        assert!((config.stream.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = config_from(&[
            ("MARKET_HUB_STREAM_URL", "wss://example.test"),
            ("MARKET_HUB_BROADCAST_CAPACITY", "0"),
        ])
        .unwrap_err();

        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MARKET_HUB_BROADCAST_CAPACITY")
        );
    }

    #[test_case("HEARTBEAT_INTERVAL_SECS", "0" ; "zero heartbeat interval")]
    #[test_case("HEARTBEAT_TIMEOUT_SECS", "0" ; "zero heartbeat timeout")]
    #[test_case("RECONNECT_DELAY_MAX_SECS", "0" ; "zero max delay")]
    #[test_case("RECONNECT_JITTER", "NaN" ; "nan jitter")]
    #[test_case("RECONNECT_JITTER", "inf" ; "infinite jitter")]
    #[test_case("RECONNECT_JITTER", "-0.1" ; "negative jitter")]
    #[test_case("RECONNECT_DELAY_MULTIPLIER", "NaN" ; "nan multiplier")]
    #[test_case("RECONNECT_DELAY_MULTIPLIER", "inf" ; "infinite multiplier")]
    #[test_case("RECONNECT_DELAY_MULTIPLIER", "0.5" ; "shrinking multiplier")]
    fn out_of_range_stream_values_are_rejected(name: &str, value: &str) {
        let key = format!("MARKET_HUB_{name}");
        let err = config_from(&[
            ("MARKET_HUB_STREAM_URL", "wss://example.test"),
            (key.as_str(), value),
        ])
        .unwrap_err();

        assert!(
            matches!(err, ConfigError::InvalidValue { key: ref k, .. } if *k == key),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn boundary_stream_values_are_accepted() {
        let config = config_from(&[
            ("MARKET_HUB_STREAM_URL", "wss://example.test"),
            ("MARKET_HUB_RECONNECT_JITTER", "0"),
            ("MARKET_HUB_RECONNECT_DELAY_MULTIPLIER", "1"),
            ("MARKET_HUB_RECONNECT_DELAY_INITIAL_MS", "0"),
        ])
        .unwrap();

        assert!(config.stream.reconnect_jitter.abs() < f64::EPSILON);
        assert!((config.stream.reconnect_delay_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.stream.reconnect_delay_initial, Duration::ZERO);
    }
}
