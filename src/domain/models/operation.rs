//! Operation descriptors and per-call configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether an operation is safe to re-issue without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Read)
    }
}

/// Static description of a registered operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Stable identifier callers pass to `execute` (for example
    /// `"property.version.get"`).
    pub id: String,
    /// Resource family, matching the leading path segment of the
    /// operation's requests (which is what keys the circuit breaker).
    pub family: String,
    pub kind: OperationKind,
}

impl OperationSpec {
    pub fn read(id: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            family: family.into(),
            kind: OperationKind::Read,
        }
    }

    pub fn write(id: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            family: family.into(),
            kind: OperationKind::Write,
        }
    }
}

/// Per-call options recognized by `execute` and `execute_bulk`.
#[derive(Debug, Clone, Default)]
pub struct OperationConfig {
    /// Override the default cache TTL for this operation's results.
    pub cache_ttl: Option<Duration>,
    /// Bypass the cache entirely and write the fresh result back.
    pub force_refresh: bool,
    /// Bounded concurrency for bulk execution.
    pub batch_size: Option<usize>,
    /// Abort the batch on the first failure instead of collecting per-item
    /// errors.
    pub stop_on_error: bool,
    /// Client-side wait deadline for activation polling.
    pub max_wait: Option<Duration>,
    /// Skip the staging-first safety step and activate the requested network
    /// directly.
    pub skip_staging: bool,
    /// Warning codes the caller explicitly acknowledges as acceptable.
    pub acknowledged_warnings: Vec<String>,
}

impl OperationConfig {
    pub fn with_force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}
