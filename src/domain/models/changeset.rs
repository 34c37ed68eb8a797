//! Changelist state machine.
//!
//! A changeset is a staged, uncommitted batch of edits owned exclusively by
//! one logical scope (for example one zone) at a time. Transitions are
//! enumerated here so the single-lease and deterministic-terminal invariants
//! are checkable independent of control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};

/// Lifecycle states of a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSetState {
    Idle,
    Open,
    Staged,
    Submitted,
    Activating,
    Active,
    Failed,
}

impl ChangeSetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Failed)
    }

    /// Legal forward transitions.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Open)
                | (Self::Open, Self::Staged)
                | (Self::Open | Self::Staged, Self::Submitted)
                | (Self::Submitted, Self::Activating)
                | (Self::Submitted | Self::Activating, Self::Active)
                | (
                    Self::Open | Self::Staged | Self::Submitted | Self::Activating,
                    Self::Failed
                )
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Staged => "staged",
            Self::Submitted => "submitted",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

/// Operation kind of a staged edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    Add,
    Modify,
    Delete,
}

/// A single staged edit within a changeset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedEdit {
    pub op: EditOp,
    /// Resource-relative path the edit applies to (for example a record set
    /// name within a zone).
    pub target: String,
    pub body: Value,
}

impl StagedEdit {
    pub fn add(target: impl Into<String>, body: Value) -> Self {
        Self {
            op: EditOp::Add,
            target: target.into(),
            body,
        }
    }

    pub fn modify(target: impl Into<String>, body: Value) -> Self {
        Self {
            op: EditOp::Modify,
            target: target.into(),
            body,
        }
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self {
            op: EditOp::Delete,
            target: target.into(),
            body: Value::Null,
        }
    }
}

/// A changeset and its current position in the lifecycle.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Remote changelist identifier, assigned at open.
    pub id: String,
    /// Logical scope that owns this changeset (for example a zone name).
    pub scope: String,
    pub state: ChangeSetState,
    pub edits: Vec<StagedEdit>,
    pub opened_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
}

impl ChangeSet {
    pub fn open(id: impl Into<String>, scope: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            scope: scope.into(),
            state: ChangeSetState::Open,
            edits: Vec::new(),
            opened_at: now,
            state_changed_at: now,
        }
    }

    /// Advance the state machine, rejecting illegal transitions.
    pub fn transition(&mut self, next: ChangeSetState) -> OrchestratorResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestratorError::Conflict(format!(
                "changeset {} for scope {}: illegal transition {} -> {}",
                self.id,
                self.scope,
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        self.state_changed_at = Utc::now();
        Ok(())
    }
}
