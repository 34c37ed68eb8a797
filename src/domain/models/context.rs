//! Tenant identity and resource scoping contexts.
//!
//! The remote API addresses most resources through a hierarchical
//! contract/group tuple that callers rarely know up front. Context discovery
//! resolves loose hints into these tuples; everything else in the layer
//! threads the tenant explicitly so one process can serve many tenants
//! concurrently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant identity threaded through every call.
///
/// Never bound to a client at construction; per-call passing is what allows
/// concurrent multi-tenant execution in one process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable scoping tuple required to address a resource family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContext {
    pub contract_id: String,
    pub group_id: String,
}

impl ResourceContext {
    pub fn new(contract_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            group_id: group_id.into(),
        }
    }
}

impl fmt::Display for ResourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.contract_id, self.group_id)
    }
}

/// Loose caller-supplied identifiers for context discovery.
///
/// A hint that carries both ids fully specifies the tuple; a name-only hint
/// triggers enumeration of the tenant's contracts and groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ContextHint {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Whether the hint already carries the full scoping tuple.
    pub fn is_fully_specified(&self) -> bool {
        self.contract_id.is_some() && self.group_id.is_some()
    }

    pub fn to_context(&self) -> Option<ResourceContext> {
        match (&self.contract_id, &self.group_id) {
            (Some(c), Some(g)) => Some(ResourceContext::new(c.clone(), g.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_specified_hint() {
        let hint = ContextHint {
            contract_id: Some("ctr_1".into()),
            group_id: Some("grp_2".into()),
            name: None,
        };
        assert!(hint.is_fully_specified());
        assert_eq!(
            hint.to_context(),
            Some(ResourceContext::new("ctr_1", "grp_2"))
        );
    }

    #[test]
    fn test_name_only_hint() {
        let hint = ContextHint::named("www.example.com");
        assert!(!hint.is_fully_specified());
        assert!(hint.to_context().is_none());
    }
}
