//! Versions, networks, and the activation rollout state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deployment target with independent activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Staging,
    Production,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// Point-in-time configuration of a resource.
///
/// A version currently bound to a live network is immutable; mutation
/// requires cloning into a new version first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub resource_id: String,
    pub version: u64,
    /// Networks this version is currently active on.
    #[serde(default)]
    pub active_on: Vec<Network>,
    #[serde(default)]
    pub note: Option<String>,
}

impl VersionInfo {
    /// An active version must not be edited in place.
    pub fn is_mutable(&self) -> bool {
        self.active_on.is_empty()
    }
}

/// Rollout states reported by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    Pending,
    Validating,
    Deploying,
    Propagating,
    Active,
    Failed,
    Aborted,
}

impl ActivationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Failed | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Deploying => "deploying",
            Self::Propagating => "propagating",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    /// Parse the remote status string, treating anything unrecognized as a
    /// still-pending report rather than failing the poll loop.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "validating" => Self::Validating,
            "deploying" | "zone1" | "zone2" => Self::Deploying,
            "propagating" | "zone3" => Self::Propagating,
            "active" => Self::Active,
            "failed" => Self::Failed,
            "aborted" => Self::Aborted,
            _ => Self::Pending,
        }
    }
}

/// A tracked rollout of one version to one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub id: String,
    pub resource_id: String,
    pub version: u64,
    pub network: Network,
    pub state: ActivationState,
    pub submitted_at: DateTime<Utc>,
}

/// Validation warning severity, as partitioned by the activation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    /// Safe to fix automatically, then re-validate once.
    AutoFixable,
    /// Requires explicit caller acknowledgment; never silently overridden.
    Blocking,
}

/// One warning from version validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub severity: WarningSeverity,
    /// Remote-supplied fix payload for auto-fixable warnings.
    #[serde(default)]
    pub fix: Option<Value>,
}

/// Outcome of an activation request.
#[derive(Debug, Clone)]
pub enum ActivationResult {
    /// The version reached `ACTIVE` on the requested network.
    Activated(Activation),
    /// Activated to staging only; production requires a separate explicit
    /// call.
    Staged {
        activation: Activation,
        guidance: String,
    },
    /// Blocking warnings need caller acknowledgment before activation can
    /// proceed.
    Blocked {
        warnings: Vec<ValidationWarning>,
    },
}

impl ActivationResult {
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated(_))
    }
}
