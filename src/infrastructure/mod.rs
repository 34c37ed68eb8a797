//! Adapters for the domain ports: configuration, transport, persistence,
//! and logging.

pub mod config;
pub mod gateway;
pub mod logging;
pub mod stats;
