//! Configuration for sessions, retries and writers.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Retry behaviour for session RPCs.
///
/// Durations are written in milliseconds in config files
/// (`interval_ms`, `max_delay_ms`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base wait after a failed attempt.
    #[serde(rename = "interval_ms", deserialize_with = "millis")]
    pub interval: Duration,
    /// Double the wait after every failure.
    pub exponential: bool,
    /// Upper bound on any single wait.
    #[serde(rename = "max_delay_ms", deserialize_with = "millis")]
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with the default one second interval.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval: Duration::from_millis(1000),
            exponential: true,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
            exponential: false,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the base interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets exponential or fixed backoff.
    pub fn with_exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Sets the maximum single wait.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait after the failed attempt with 0-based index `attempt`.
    ///
    /// `interval * 2^attempt` when exponential, otherwise `interval`; never
    /// more than `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = if self.exponential {
            1u32.checked_shl(attempt)
                .and_then(|factor| self.interval.checked_mul(factor))
                .unwrap_or(self.max_delay)
        } else {
            self.interval
        };
        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for sessions against one remote project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Remote project name.
    pub project: String,
    /// Data channel endpoint, when it differs from the service endpoint.
    #[serde(default)]
    pub tunnel_endpoint: Option<String>,
    /// Ask for compressed record streams.
    #[serde(default)]
    pub compress: bool,
    /// Retry policy applied to every session RPC.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SessionConfig {
    /// Creates a session configuration.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            tunnel_endpoint: None,
            compress: false,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the data channel endpoint.
    pub fn with_tunnel_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.tunnel_endpoint = Some(endpoint.into());
        self
    }

    /// Enables compressed streams.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Target options for a write job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Partition text such as `pt=20240301,region=eu`.
    pub partition: Option<String>,
    /// Replace the target partition (or table) instead of appending.
    pub truncate: bool,
}

impl WriterConfig {
    /// Creates an append-mode writer configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target partition.
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Sets overwrite mode.
    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert!(config.exponential);
    }

    #[test]
    fn exponential_delay() {
        let config = RetryConfig::new(5).with_interval(Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn fixed_delay() {
        let config = RetryConfig::new(5)
            .with_interval(Duration::from_millis(250))
            .with_exponential(false);
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(250));
    }

    #[test]
    fn delay_respects_max() {
        let config = RetryConfig::new(50)
            .with_interval(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn session_config_builder() {
        let config = SessionConfig::new("analytics")
            .with_tunnel_endpoint("http://tunnel.internal")
            .with_compress(true)
            .with_retry(RetryConfig::no_retry());
        assert_eq!(config.project, "analytics");
        assert_eq!(config.tunnel_endpoint.as_deref(), Some("http://tunnel.internal"));
        assert!(config.compress);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn session_config_from_json() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"project": "analytics", "retry": {"max_attempts": 5, "interval_ms": 20}}"#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.interval, Duration::from_millis(20));
        assert!(config.retry.exponential);
        assert!(!config.compress);
    }

    #[test]
    fn writer_config_from_json() {
        let config: WriterConfig =
            serde_json::from_str(r#"{"partition": "pt=1", "truncate": true}"#).unwrap();
        assert_eq!(config, WriterConfig::new().with_partition("pt=1").with_truncate(true));
    }
}
