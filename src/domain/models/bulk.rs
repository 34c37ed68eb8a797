//! Bulk job results.

use serde_json::Value;

use crate::domain::errors::OrchestratorError;

/// Outcome of a single bulk item.
#[derive(Debug)]
pub struct BulkItemOutcome {
    pub input: Value,
    pub result: Result<Value, OrchestratorError>,
}

/// Ordered results of one bulk execution.
///
/// Created and destroyed entirely within one `execute_bulk` call; item order
/// always equals input order regardless of completion order.
#[derive(Debug, Default)]
pub struct BulkJob {
    pub items: Vec<BulkItemOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkJob {
    pub fn from_outcomes(items: Vec<BulkItemOutcome>) -> Self {
        let succeeded = items.iter().filter(|i| i.result.is_ok()).count();
        let failed = items.len() - succeeded;
        Self {
            items,
            succeeded,
            failed,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
