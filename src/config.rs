//! Configuration module - endpoint, timeouts and retry settings

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Default Google Photos upload endpoint
pub const DEFAULT_ENDPOINT: &str = "https://photoslibrary.googleapis.com/v1/uploads";

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("gphotos-uploader-rs/", env!("CARGO_PKG_VERSION"));

/// Default connection establishment timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout between reads in seconds; bodies may take longer overall
const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

/// Default maximum attempts per request (first try included)
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default first backoff delay in milliseconds
const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;

/// Default backoff ceiling in milliseconds
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Default wait after a 429 without a usable Retry-After header
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 30;

/// Default HTTP wire log location
const DEFAULT_HTTP_LOG_PATH: &str = ".gphotos-uploader/http_requests.log";

/// Optional configuration parameters for Config::new()
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub rate_limit_wait_secs: Option<u64>,
    pub http_log_path: Option<PathBuf>,
}

/// Retry and backoff settings consumed by the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts allowed per request, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for every further attempt
    pub base_backoff: Duration,
    /// Upper bound for exponential delays
    pub max_backoff: Duration,
    /// Wait used for 429 responses that carry no usable Retry-After
    pub rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            rate_limit_wait: Duration::from_secs(DEFAULT_RATE_LIMIT_WAIT_SECS),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Per-read timeout, not a bound on the whole request
    pub read_timeout: Duration,
    pub retry: RetryConfig,
    pub http_log_path: PathBuf,
}

impl Config {
    /// Create a new Config, filling unset options with defaults
    pub fn new(options: ConfigOptions) -> Result<Arc<Self>> {
        let endpoint = options
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();

        if endpoint.is_empty() {
            return Err(anyhow!("endpoint cannot be empty"));
        }

        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            return Err(anyhow!(
                "endpoint must use http:// or https:// scheme: {}",
                endpoint
            ));
        }

        let user_agent = options
            .user_agent
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: options.max_attempts.unwrap_or(defaults.max_attempts),
            base_backoff: options
                .base_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            max_backoff: options
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            rate_limit_wait: options
                .rate_limit_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_wait),
        };

        if retry.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }

        if retry.base_backoff > retry.max_backoff {
            return Err(anyhow!(
                "base_backoff ({}ms) cannot exceed max_backoff ({}ms)",
                retry.base_backoff.as_millis(),
                retry.max_backoff.as_millis()
            ));
        }

        let connect_timeout_secs = options
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let read_timeout_secs = options
            .read_timeout_secs
            .unwrap_or(DEFAULT_READ_TIMEOUT_SECS);
        if connect_timeout_secs == 0 || read_timeout_secs == 0 {
            return Err(anyhow!("timeouts must be greater than zero"));
        }

        Ok(Arc::new(Self {
            endpoint,
            user_agent,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            read_timeout: Duration::from_secs(read_timeout_secs),
            retry,
            http_log_path: options
                .http_log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HTTP_LOG_PATH)),
        }))
    }

    /// Configuration with every default applied
    pub fn with_defaults() -> Arc<Self> {
        Arc::new(Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            retry: RetryConfig::default(),
            http_log_path: PathBuf::from(DEFAULT_HTTP_LOG_PATH),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_defaults_matches_empty_options() {
        let built = Config::new(ConfigOptions::default()).unwrap();
        let defaults = Config::with_defaults();
        assert_eq!(built.endpoint, defaults.endpoint);
        assert_eq!(built.user_agent, defaults.user_agent);
        assert_eq!(built.connect_timeout, defaults.connect_timeout);
        assert_eq!(built.read_timeout, defaults.read_timeout);
        assert_eq!(built.retry, defaults.retry);
        assert_eq!(built.http_log_path, defaults.http_log_path);
    }

    #[test]
    fn test_blank_user_agent_falls_back() {
        let config = Config::new(ConfigOptions {
            user_agent: Some("   ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }
}
