//! Event service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The three listen durations are
//! grouped in [`WaitingTimes`], which validates their relationship.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::EventServiceError;

/// Default minimum waiting time of a listen call, in milliseconds.
pub const DEFAULT_MIN_WAITING_TIME_MS: u64 = 0;
/// Default maximum waiting time of a listen call, in milliseconds.
pub const DEFAULT_MAX_WAITING_TIME_MS: u64 = 20_000;
/// Default idle timeout before a registration is evicted, in milliseconds.
pub const DEFAULT_TIMEOUT_TIME_MS: u64 = 90_000;
/// Default period of the eviction sweep, in milliseconds.
pub const DEFAULT_EVICTION_INTERVAL_MS: u64 = 5_000;

/// Listen timing parameters.
///
/// Invariants: `min <= max` and `timeout >= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitingTimes {
    min: Duration,
    max: Duration,
    timeout: Duration,
}

impl WaitingTimes {
    /// Creates validated waiting times.
    ///
    /// # Errors
    ///
    /// Returns [`EventServiceError::Configuration`] if `min > max` or
    /// `timeout < max`.
    pub fn new(min: Duration, max: Duration, timeout: Duration) -> Result<Self, EventServiceError> {
        if min > max {
            return Err(EventServiceError::Configuration(format!(
                "minimum waiting time ({}ms) exceeds maximum waiting time ({}ms)",
                min.as_millis(),
                max.as_millis()
            )));
        }
        if timeout < max {
            return Err(EventServiceError::Configuration(format!(
                "timeout ({}ms) is shorter than maximum waiting time ({}ms)",
                timeout.as_millis(),
                max.as_millis()
            )));
        }
        Ok(Self { min, max, timeout })
    }

    /// Creates validated waiting times from milliseconds.
    ///
    /// # Errors
    ///
    /// See [`WaitingTimes::new`].
    pub fn from_millis(min: u64, max: u64, timeout: u64) -> Result<Self, EventServiceError> {
        Self::new(
            Duration::from_millis(min),
            Duration::from_millis(max),
            Duration::from_millis(timeout),
        )
    }

    /// Time a listen call waits at least, measured from the last batch.
    #[must_use]
    pub const fn min(&self) -> Duration {
        self.min
    }

    /// Time after which a listen call returns even without events.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Idle time after which a registration is evicted.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for WaitingTimes {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(DEFAULT_MIN_WAITING_TIME_MS),
            max: Duration::from_millis(DEFAULT_MAX_WAITING_TIME_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_TIME_MS),
        }
    }
}

impl fmt::Display for WaitingTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Min.: {}ms; Max.: {}ms; Timeout: {}ms",
            self.min.as_millis(),
            self.max.as_millis(),
            self.timeout.as_millis()
        )
    }
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`EventServiceConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EventServiceConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Listen timing and idle timeout.
    pub waiting_times: WaitingTimes,

    /// Period of the background eviction sweep.
    pub eviction_interval: Duration,
}

impl EventServiceConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`EventServiceError::Configuration`] if a variable is set
    /// but unparsable, or if the waiting times are inconsistent.
    pub fn from_env() -> Result<Self, EventServiceError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`EventServiceConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EventServiceError> {
        let listen_addr = parse_var(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let waiting_times = WaitingTimes::from_millis(
            parse_var(&lookup, "MIN_WAITING_TIME_MS", DEFAULT_MIN_WAITING_TIME_MS)?,
            parse_var(&lookup, "MAX_WAITING_TIME_MS", DEFAULT_MAX_WAITING_TIME_MS)?,
            parse_var(&lookup, "TIMEOUT_TIME_MS", DEFAULT_TIMEOUT_TIME_MS)?,
        )?;

        let eviction_interval = Duration::from_millis(parse_var(
            &lookup,
            "EVICTION_INTERVAL_MS",
            DEFAULT_EVICTION_INTERVAL_MS,
        )?);
        if eviction_interval.is_zero() {
            return Err(EventServiceError::Configuration(
                "EVICTION_INTERVAL_MS must be positive".to_string(),
            ));
        }

        Ok(Self {
            listen_addr,
            waiting_times,
            eviction_interval,
        })
    }
}

/// Parses the variable `key` as `T`, returning `default` when it is unset.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, EventServiceError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err| {
            EventServiceError::Configuration(format!("invalid value {raw:?} for {key}: {err}"))
        }),
    }
}
