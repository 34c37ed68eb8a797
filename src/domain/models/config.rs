//! Configuration for the orchestration layer.
//!
//! Thresholds the source protocol leaves open (breaker threshold and
//! cool-down, refresh-ahead fraction, poll schedule) are tunables here, not
//! fixed contracts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub activation: ActivationConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Alternate tenant credential for the account-switch recovery strategy.
    /// When unset, permission failures are surfaced.
    #[serde(default)]
    pub alternate_tenant: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            activation: ActivationConfig::default(),
            bulk: BulkConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
            alternate_tenant: None,
        }
    }
}

/// Intelligent cache tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// LRU entry cap per tenant partition.
    #[serde(default = "default_max_entries")]
    pub max_entries_per_tenant: usize,

    /// Default TTL for operation results.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL for resolved scoping contexts (slow-changing metadata).
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,

    /// Fraction of TTL after which a read triggers a background refresh.
    #[serde(default = "default_refresh_fraction")]
    pub refresh_ahead_fraction: f64,
}

const fn default_max_entries() -> usize {
    1024
}

const fn default_ttl_secs() -> u64 {
    300
}

const fn default_context_ttl_secs() -> u64 {
    86_400
}

const fn default_refresh_fraction() -> f64 {
    0.8
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries_per_tenant: default_max_entries(),
            default_ttl_secs: default_ttl_secs(),
            context_ttl_secs: default_context_ttl_secs(),
            refresh_ahead_fraction: default_refresh_fraction(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }
}

/// Circuit breaker tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cool-down before a half-open probe is allowed, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Sliding window within which failures count as consecutive, in
    /// milliseconds.
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown_ms() -> u64 {
    60_000
}

const fn default_failure_window_ms() -> u64 {
    60_000
}

const fn default_true() -> bool {
    true
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            failure_window_ms: default_failure_window_ms(),
            enabled: default_true(),
        }
    }
}

/// Retry ladder for the `retry_with_backoff` strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles per retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// EWMA weight for the newest strategy outcome.
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_ewma_alpha() -> f64 {
    0.3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            ewma_alpha: default_ewma_alpha(),
        }
    }
}

/// Activation polling tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ActivationConfig {
    /// Progressive poll delays in milliseconds; the last entry repeats.
    #[serde(default = "default_poll_delays_ms")]
    pub poll_delays_ms: Vec<u64>,

    /// Default client-side wait deadline in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub default_max_wait_ms: u64,
}

fn default_poll_delays_ms() -> Vec<u64> {
    vec![5_000, 10_000, 30_000, 60_000]
}

const fn default_max_wait_ms() -> u64 {
    900_000
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            poll_delays_ms: default_poll_delays_ms(),
            default_max_wait_ms: default_max_wait_ms(),
        }
    }
}

/// Bulk executor tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BulkConfig {
    /// Bounded concurrency for bulk items.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

const fn default_batch_size() -> usize {
    5
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// HTTP gateway tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    /// Base URL of the remote API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Client-side request rate, requests per second.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.edge.invalid".to_string()
}

const fn default_requests_per_second() -> u32 {
    10
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            requests_per_second: default_requests_per_second(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
