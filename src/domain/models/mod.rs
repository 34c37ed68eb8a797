//! Domain models for the orchestration layer.

pub mod activation;
pub mod bulk;
pub mod changeset;
pub mod config;
pub mod context;
pub mod operation;
pub mod recovery;

pub use activation::{
    Activation, ActivationResult, ActivationState, Network, ValidationWarning, VersionInfo,
    WarningSeverity,
};
pub use bulk::{BulkItemOutcome, BulkJob};
pub use changeset::{ChangeSet, ChangeSetState, EditOp, StagedEdit};
pub use config::{
    ActivationConfig, BreakerConfig, BulkConfig, CacheConfig, GatewayConfig, LoggingConfig,
    OrchestratorConfig, RetryConfig,
};
pub use context::{ContextHint, ResourceContext, TenantId};
pub use operation::{OperationConfig, OperationKind, OperationSpec};
pub use recovery::{ErrorClass, StrategyKind, StrategyStat};
