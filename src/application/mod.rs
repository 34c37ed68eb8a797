//! Application facade: operation registry and the orchestrator itself.

pub mod orchestrator;

pub use orchestrator::{
    OperationContext, OperationHandler, OperationOutcome, OperationRegistry, Orchestrator,
};
