use std::time::Duration;

use serde::Deserialize;

/// Retry and failover policy applied to every client request
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailoverConfig {
    /// Maximum number of distinct candidates tried per request
    #[serde(default = "default_max_provider_attempts")]
    pub max_provider_attempts: usize,
    /// Extra attempts against the same candidate before moving on
    #[serde(default = "default_same_provider_retries")]
    pub same_provider_retries: u32,
    /// Upstream HTTP statuses worth retrying
    #[serde(default = "default_retriable_status_codes")]
    pub retriable_status_codes: Vec<u16>,
    /// Network error codes or message fragments worth retrying
    #[serde(default = "default_retriable_network_errors")]
    pub retriable_network_errors: Vec<String>,
    /// Delay schedule between attempts
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Optional deadline for the whole failover sequence in milliseconds
    #[serde(default)]
    pub total_timeout_ms: Option<u64>,
}

impl FailoverConfig {
    /// Per-attempt timeout
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Overall deadline, if configured
    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout_ms.map(Duration::from_millis)
    }

    /// Attempts made against each candidate
    pub const fn attempts_per_candidate(&self) -> u32 {
        self.same_provider_retries.saturating_add(1)
    }

    /// Whether an upstream status should be retried
    pub fn is_retriable_status(&self, status: u16) -> bool {
        self.retriable_status_codes.contains(&status)
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_provider_attempts: default_max_provider_attempts(),
            same_provider_retries: default_same_provider_retries(),
            retriable_status_codes: default_retriable_status_codes(),
            retriable_network_errors: default_retriable_network_errors(),
            backoff: BackoffConfig::default(),
            timeout_ms: default_timeout_ms(),
            total_timeout_ms: None,
        }
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound of the exponential part in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    #[serde(default = "default_exponent")]
    pub exponent: f64,
    /// Random extra delay as a fraction of the capped delay, in `[0, 1]`
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponent: default_exponent(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

const fn default_max_provider_attempts() -> usize {
    3
}

const fn default_same_provider_retries() -> u32 {
    1
}

fn default_retriable_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_retriable_network_errors() -> Vec<String> {
    [
        "ECONNRESET",
        "ECONNREFUSED",
        "ETIMEDOUT",
        "ENOTFOUND",
        "EAI_AGAIN",
        "EPIPE",
        "ECONNABORTED",
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "socket hang up",
        "aborted",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

const fn default_timeout_ms() -> u64 {
    120_000
}

const fn default_base_delay_ms() -> u64 {
    100
}

const fn default_max_delay_ms() -> u64 {
    5_000
}

const fn default_exponent() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.1
}
