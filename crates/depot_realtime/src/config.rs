//! Configuration for the realtime channel

use depot_config::RealtimeConfig;
use std::time::Duration;

/// Host used when the configured URL is empty or a bare path
pub const DEFAULT_WS_ORIGIN: &str = "ws://localhost:8000";

/// Timing and retry limits of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Already resolved `ws://` / `wss://` URL
    pub url: String,

    /// First reconnect delay; doubles per attempt
    pub base_delay: Duration,

    /// Upper bound of any reconnect delay
    pub max_delay: Duration,

    /// Failures tolerated before the channel gives up for good
    pub max_attempts: u32,

    pub heartbeat_interval: Duration,

    /// How long a ping may stay unanswered
    pub pong_timeout: Duration,

    /// Minimum spacing between two pings
    pub min_ping_interval: Duration,

    pub connect_timeout: Duration,
}

impl ChannelConfig {
    /// Defaults with `url` passed through [`resolve_url`]
    pub fn new(url: &str) -> Self {
        Self {
            url: resolve_url(url),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(crate::ChannelError::ConfigError(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        if self.max_attempts == 0 {
            return Err(crate::ChannelError::ConfigError(
                "max_attempts must be at least 1".into(),
            ));
        }
        let zero = [
            ("base_delay", self.base_delay),
            ("heartbeat_interval", self.heartbeat_interval),
            ("pong_timeout", self.pong_timeout),
            ("connect_timeout", self.connect_timeout),
        ]
        .into_iter()
        .find(|(_, value)| value.is_zero());
        if let Some((name, _)) = zero {
            return Err(crate::ChannelError::ConfigError(format!("{} must be non-zero", name)));
        }
        if self.max_delay < self.base_delay {
            return Err(crate::ChannelError::ConfigError(
                "max_delay must not be below base_delay".into(),
            ));
        }
        Ok(())
    }

    /// Reconnect delay for the 1-based `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, self.max_delay, attempt)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: format!("{}/ws/stock", DEFAULT_WS_ORIGIN),
            base_delay: Duration::from_millis(3_000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
            heartbeat_interval: Duration::from_millis(30_000),
            pong_timeout: Duration::from_millis(5_000),
            min_ping_interval: Duration::from_millis(1_000),
            connect_timeout: Duration::from_millis(20_000),
        }
    }
}

impl From<&RealtimeConfig> for ChannelConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            url: resolve_url(&config.url),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            pong_timeout: Duration::from_millis(config.pong_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            ..Self::default()
        }
    }
}

/// `min(base * 2^(attempt-1), max)`; attempt 0 is treated as 1.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

/// Normalize a configured endpoint into a websocket URL
///
/// - `http(s)://...` becomes `ws(s)://...`
/// - `/path` is resolved against [`DEFAULT_WS_ORIGIN`]
/// - `host[:port][/path]` gets `ws://`
/// - empty falls back to [`DEFAULT_WS_ORIGIN`]
pub fn resolve_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_WS_ORIGIN.to_string();
    }

    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("ws://") || lower.starts_with("wss://") {
        return raw.to_string();
    }
    if lower.starts_with("https://") {
        return format!("wss://{}", &raw["https://".len()..]);
    }
    if lower.starts_with("http://") {
        return format!("ws://{}", &raw["http://".len()..]);
    }
    if raw.starts_with('/') {
        return format!("{}{}", DEFAULT_WS_ORIGIN, raw);
    }
    format!("ws://{}", raw)
}
