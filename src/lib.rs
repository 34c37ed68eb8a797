//! Edgeflow - Resilient Workflow Orchestration Layer
//!
//! Edgeflow sits between callers and a rate-limited, eventually-consistent
//! remote configuration API. It turns loose requests into reliable workflows:
//! mutations run through staged changesets with exclusive scope leases, reads
//! flow through a tenant-partitioned refresh-ahead cache, failures pass
//! through an adaptive recovery engine, and repeated faults trip per-operation
//! circuit breakers.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, error taxonomy, and ports
//! - **Application Layer** (`application`): Operation registry and the
//!   orchestrator facade
//! - **Service Layer** (`services`): Cache, circuit breakers, recovery,
//!   changesets, activation, discovery, bulk execution
//! - **Infrastructure Layer** (`infrastructure`): HTTP gateway, config
//!   loading, stats persistence, logging
//!
//! # Example
//!
//! ```ignore
//! use edgeflow::application::Orchestrator;
//! use edgeflow::infrastructure::config::ConfigLoader;
//! use edgeflow::infrastructure::gateway::HttpGateway;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let gateway = Arc::new(HttpGateway::new(&config.gateway)?);
//!     let orchestrator = Orchestrator::new(config, gateway);
//!     // register handlers, then execute operations
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{
    OperationContext, OperationHandler, OperationOutcome, OperationRegistry, Orchestrator,
};
pub use domain::errors::{GatewayError, OrchestratorError, OrchestratorResult};
pub use domain::models::{
    Activation, ActivationResult, ActivationState, BulkJob, ChangeSet, ChangeSetState, ContextHint,
    ErrorClass, Network, OperationConfig, OperationKind, OperationSpec, OrchestratorConfig,
    ResourceContext, StagedEdit, StrategyKind, TenantId, ValidationWarning,
};
pub use domain::ports::{ApiGateway, ApiRequest, ApiResponse, Method, RecoveryStatsStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ActivationEngine, BulkExecutor, ChangeSetCoordinator, ChangeSetHandle, CircuitBreakerRegistry,
    ContextDiscovery, IntelligentCache, RecoveryEngine,
};
