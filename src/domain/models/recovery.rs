//! Error classification and recovery-strategy records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed taxonomy of failure classes assigned at the recovery engine
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimited,
    TransientServer,
    PermissionDenied,
    Timeout,
    ServiceUnavailable,
    Validation,
    Conflict,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::TransientServer => "transient_server",
            Self::PermissionDenied => "permission_denied",
            Self::Timeout => "timeout",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }
}

/// Recovery strategies the engine can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Re-issue the call with exponential backoff. Idempotent calls only.
    RetryWithBackoff,
    /// Serve the most recent cached value, tagged as potentially stale.
    /// Read paths only.
    CacheFallback,
    /// Re-issue the call under the configured alternate tenant credential.
    AccountSwitch,
    /// Return the failure to the caller with suggestions attached.
    Surface,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryWithBackoff => "retry_with_backoff",
            Self::CacheFallback => "cache_fallback",
            Self::AccountSwitch => "account_switch",
            Self::Surface => "surface",
        }
    }
}

/// Exponentially-weighted success record for one `(class, strategy)` pair.
///
/// Mutated only by the recovery engine after each attempt's outcome is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStat {
    pub class: ErrorClass,
    pub strategy: StrategyKind,
    /// EWMA of success (1.0) / failure (0.0) outcomes.
    pub success_rate: f64,
    /// Total outcomes observed.
    pub samples: u64,
    /// EWMA of attempt latency in milliseconds.
    pub mean_latency_ms: f64,
    pub updated_at: DateTime<Utc>,
}

impl StrategyStat {
    pub fn new(class: ErrorClass, strategy: StrategyKind) -> Self {
        Self {
            class,
            strategy,
            success_rate: 0.0,
            samples: 0,
            mean_latency_ms: 0.0,
            updated_at: Utc::now(),
        }
    }

    /// Fold one outcome into the record. `alpha` is the EWMA weight given to
    /// the newest observation.
    pub fn observe(&mut self, success: bool, latency_ms: u64, alpha: f64) {
        let outcome = if success { 1.0 } else { 0.0 };
        if self.samples == 0 {
            self.success_rate = outcome;
            self.mean_latency_ms = latency_ms as f64;
        } else {
            self.success_rate = alpha * outcome + (1.0 - alpha) * self.success_rate;
            self.mean_latency_ms = alpha * latency_ms as f64 + (1.0 - alpha) * self.mean_latency_ms;
        }
        self.samples += 1;
        self.updated_at = Utc::now();
    }
}
