//! Runtime configuration, read once from the environment at startup.

use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_ENDPOINT_PATH: &str = "/api/alerts";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Route the alert listing is served on, and the path clients poll.
    pub endpoint_path: String,
    /// How often the polling client refreshes its record set.
    pub refresh_interval: Duration,
    /// Site-wide fallback timezone for localized display, as an IANA name.
    pub default_timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            default_timezone: None,
        }
    }
}

impl Config {
    /// Reads `ALERTS_ENDPOINT_PATH`, `ALERTS_REFRESH_INTERVAL_MS` and
    /// `ALERTS_DEFAULT_TIMEZONE`, applying documented defaults for the
    /// first two. Malformed values are errors, not silent fallbacks.
    pub fn from_env() -> Result<Config, ConfigurationError> {
        let endpoint_path = endpoint_path(env::var("ALERTS_ENDPOINT_PATH").ok())?;
        let refresh_interval = refresh_interval(env::var("ALERTS_REFRESH_INTERVAL_MS").ok())?;
        let default_timezone = env::var("ALERTS_DEFAULT_TIMEZONE").ok();
        Ok(Config {
            endpoint_path,
            refresh_interval,
            default_timezone,
        })
    }
}

fn endpoint_path(raw: Option<String>) -> Result<String, ConfigurationError> {
    match raw {
        None => Ok(DEFAULT_ENDPOINT_PATH.to_string()),
        Some(path) if path.starts_with('/') && path.len() > 1 => Ok(path),
        Some(path) => Err(ConfigurationError::InvalidEndpointPath(path)),
    }
}

fn refresh_interval(raw: Option<String>) -> Result<Duration, ConfigurationError> {
    match raw {
        None => Ok(DEFAULT_REFRESH_INTERVAL),
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(ConfigurationError::InvalidRefreshInterval(raw)),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    MissingTimezone,
    InvalidTimezone(String),
    InvalidRefreshInterval(String),
    InvalidEndpointPath(String),
}

impl std::error::Error for ConfigurationError {}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigurationError::MissingTimezone => write!(
                f,
                "no timezone was requested and ALERTS_DEFAULT_TIMEZONE is not set"
            ),
            ConfigurationError::InvalidTimezone(name) => {
                write!(f, "{name:?} is not a known IANA timezone")
            }
            ConfigurationError::InvalidRefreshInterval(raw) => write!(
                f,
                "ALERTS_REFRESH_INTERVAL_MS must be a positive number of milliseconds, got {raw:?}"
            ),
            ConfigurationError::InvalidEndpointPath(path) => write!(
                f,
                "ALERTS_ENDPOINT_PATH must be an absolute path like {DEFAULT_ENDPOINT_PATH:?}, got {path:?}"
            ),
        }
    }
}
