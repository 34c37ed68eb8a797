//! Orchestration services built on the domain ports.

pub mod activation;
pub mod bulk;
pub mod cache;
pub mod changeset;
pub mod circuit_breaker;
pub mod context_discovery;
pub mod recovery;

pub use activation::ActivationEngine;
pub use bulk::{BulkExecutor, BulkWorker, ProgressFn};
pub use cache::{CacheLoader, CacheReadOptions, IntelligentCache};
pub use changeset::{ChangeSetCoordinator, ChangeSetHandle, ChangeSetOutcome};
pub use circuit_breaker::{Admission, CircuitBreakerRegistry, CircuitState, CircuitStats};
pub use context_discovery::ContextDiscovery;
pub use recovery::{CallMeta, Recovered, RecoveryEngine};
