//! Optional durable backend for recovery statistics.
//!
//! Cache entries, breaker state, and leases live purely in process memory;
//! only the learned strategy rankings are worth preserving across restarts.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::StrategyStat;

/// Pluggable store for recovery-strategy statistics.
#[async_trait]
pub trait RecoveryStatsStore: Send + Sync {
    /// Load all persisted records. An empty store yields an empty vec.
    async fn load(&self) -> OrchestratorResult<Vec<StrategyStat>>;

    /// Replace the persisted records with the given snapshot.
    async fn save(&self, stats: &[StrategyStat]) -> OrchestratorResult<()>;
}
