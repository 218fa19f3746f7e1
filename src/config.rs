//! Session and API configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_REFRESH_LEEWAY_SECS: u64 = 60;
pub const DEFAULT_STORAGE_NAMESPACE: &str = "jobmarket.session";
pub const DEFAULT_API_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: String },
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

// =============================================================================
// SESSION CONFIG
// =============================================================================

/// Tuning for the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Period of the background token refresh sweep.
    pub refresh_interval: Duration,
    /// A token expiring within this window is refreshed early.
    pub refresh_leeway: Duration,
    /// Prefix for persisted storage keys.
    pub storage_namespace: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            refresh_leeway: Duration::from_secs(DEFAULT_REFRESH_LEEWAY_SECS),
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// - `SESSION_REFRESH_INTERVAL_SECS`: default 300
    /// - `SESSION_REFRESH_LEEWAY_SECS`: default 60
    /// - `SESSION_STORAGE_NAMESPACE`: default `jobmarket.session`
    #[must_use]
    pub fn from_env() -> Self {
        let interval_secs = env_parse("SESSION_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS).max(1);
        let leeway_secs = env_parse("SESSION_REFRESH_LEEWAY_SECS", DEFAULT_REFRESH_LEEWAY_SECS);
        let storage_namespace = std::env::var("SESSION_STORAGE_NAMESPACE")
            .ok()
            .map(|ns| ns.trim().to_owned())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_NAMESPACE.to_owned());
        Self {
            refresh_interval: Duration::from_secs(interval_secs),
            refresh_leeway: Duration::from_secs(leeway_secs),
            storage_namespace,
        }
    }

    /// Leeway in whole seconds, for comparing against token claims.
    #[must_use]
    pub fn leeway_secs(&self) -> i64 {
        i64::try_from(self.refresh_leeway.as_secs()).unwrap_or(i64::MAX)
    }
}

// =============================================================================
// API CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Location and timeouts of the REST auth backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL without a trailing slash, e.g. `https://api.example.com/api`.
    pub base_url: String,
    pub timeouts: ApiTimeouts,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeouts: ApiTimeouts {
                request_secs: DEFAULT_API_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_API_CONNECT_TIMEOUT_SECS,
            },
        }
    }

    /// Build from environment variables.
    ///
    /// Required:
    /// - `API_BASE_URL`
    ///
    /// Optional:
    /// - `API_REQUEST_TIMEOUT_SECS`: default 30
    /// - `API_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if `API_BASE_URL` is missing or not an http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("API_BASE_URL").map_err(|_| ConfigError::Missing { var: "API_BASE_URL".into() })?;
        let raw = raw.trim();
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "API_BASE_URL".into(),
                reason: format!("expected an http(s) URL, got '{raw}'"),
            });
        }
        let mut config = Self::new(raw);
        config.timeouts = ApiTimeouts {
            request_secs: env_parse("API_REQUEST_TIMEOUT_SECS", DEFAULT_API_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("API_CONNECT_TIMEOUT_SECS", DEFAULT_API_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }

    /// Absolute URL for an API path such as `/auth/login`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
