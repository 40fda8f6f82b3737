//! Client configuration.
//!
//! Credentials and endpoints are never compiled in: they come from a
//! [`ClientConfig`] built in code, read from the environment, or loaded
//! from a JSON file.
//!
//! ```json
//! {
//!   "api_key": "tsk_...",
//!   "base_url": "https://api.tripo3d.ai/v2/openapi",
//!   "timeout": 600,
//!   "poll_interval": 5
//! }
//! ```

use crate::error::{MeshGenError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Public Tripo3D OpenAPI endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.tripo3d.ai/v2/openapi";
/// Overall deadline for one request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// Wait between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "TRIPO_API_KEY";
/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "TRIPO_BASE_URL";
/// Environment variable overriding the timeout, in seconds.
pub const TIMEOUT_ENV: &str = "TRIPO_TIMEOUT_SECS";
/// Environment variable overriding the poll interval, in seconds.
pub const POLL_INTERVAL_ENV: &str = "TRIPO_POLL_INTERVAL_SECS";

/// Settings for talking to the remote job API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Bearer API key.
    pub api_key: String,
    /// API root, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overall deadline for one request, in seconds.
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,
    /// Wait between status queries, in seconds.
    #[serde(default = "default_poll_interval", with = "duration_secs")]
    pub poll_interval: Duration,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl ClientConfig {
    /// Creates a config with default endpoint and timings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Reads `TRIPO_API_KEY`, `TRIPO_BASE_URL`, `TRIPO_TIMEOUT_SECS` and
    /// `TRIPO_POLL_INTERVAL_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_ENV)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MeshGenError::Auth(format!("{API_KEY_ENV} not set")))?;

        let mut config = Self::new(api_key);
        if let Some(url) = lookup(BASE_URL_ENV) {
            config.base_url = url;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            config.timeout = parse_secs(TIMEOUT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            config.poll_interval = parse_secs(POLL_INTERVAL_ENV, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MeshGenError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Rejects configs that cannot drive a request.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(MeshGenError::Auth("API key is empty".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(MeshGenError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(MeshGenError::Config("poll_interval must be non-zero".into()));
        }
        if self.timeout < self.poll_interval {
            return Err(MeshGenError::Config(format!(
                "timeout ({:?}) must not be shorter than poll_interval ({:?})",
                self.timeout, self.poll_interval
            )));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            MeshGenError::Config(format!("{name} must be a number of seconds, got {raw:?}"))
        })
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
