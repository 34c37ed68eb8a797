//! Port trait definitions (hexagonal architecture).
//!
//! These async trait interfaces define the contracts that keep the domain
//! independent of specific infrastructure:
//! - `ApiGateway`: the remote API collaborator
//! - `RecoveryStatsStore`: optional durable backend for recovery statistics

pub mod gateway;
pub mod stats_store;

pub use gateway::{ApiGateway, ApiRequest, ApiResponse, Method};
pub use stats_store::RecoveryStatsStore;
