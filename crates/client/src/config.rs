//! Session configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::ws::ReconnectConfig;

/// Quiet period after the last keystroke before `typing_stop` is sent.
pub const DEFAULT_TYPING_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Capacity of the subscriber broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Longest delay accepted from the environment. Larger values are clamped.
pub const MAX_CONFIGURED_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub typing_quiet_period: Duration,
    pub reconnect: ReconnectConfig,
    /// Slow subscribers past this many buffered events start lagging.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_quiet_period: DEFAULT_TYPING_QUIET_PERIOD,
            reconnect: ReconnectConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PARLEY_TYPING_QUIET_MS`: typing quiet period (default: 2000)
    /// - `PARLEY_RECONNECT_INTERVAL_MS`: delay before each retry (default: 5000)
    /// - `PARLEY_RECONNECT_BACKOFF`: delay multiplier per attempt (default: 1.0, fixed interval)
    /// - `PARLEY_RECONNECT_MAX_DELAY_MS`: cap on the retry delay (default: the interval)
    /// - `PARLEY_RECONNECT_MAX_ATTEMPTS`: give up after this many retries (default: 0, never)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let interval = parse_delay(&lookup, "PARLEY_RECONNECT_INTERVAL_MS")
            .unwrap_or(defaults.reconnect.interval);

        let reconnect = ReconnectConfig {
            interval,
            backoff_multiplier: parse_var(&lookup, "PARLEY_RECONNECT_BACKOFF")
                .filter(|m: &f32| *m >= 1.0)
                .unwrap_or(defaults.reconnect.backoff_multiplier),
            max_delay: parse_delay(&lookup, "PARLEY_RECONNECT_MAX_DELAY_MS").unwrap_or(interval),
            max_attempts: parse_var(&lookup, "PARLEY_RECONNECT_MAX_ATTEMPTS")
                .unwrap_or(defaults.reconnect.max_attempts),
        };

        Self {
            typing_quiet_period: parse_delay(&lookup, "PARLEY_TYPING_QUIET_MS")
                .unwrap_or(defaults.typing_quiet_period),
            reconnect,
            event_capacity: defaults.event_capacity,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}

/// A millisecond count, clamped to [`MAX_CONFIGURED_DELAY`] so deadlines never overflow.
fn parse_delay(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let delay = Duration::from_millis(parse_var(lookup, key)?);
    if delay > MAX_CONFIGURED_DELAY {
        tracing::warn!(
            key,
            requested_ms = delay.as_millis() as u64,
            max_ms = MAX_CONFIGURED_DELAY.as_millis() as u64,
            "config delay too large, clamping"
        );
        return Some(MAX_CONFIGURED_DELAY);
    }
    Some(delay)
}
