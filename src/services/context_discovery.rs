//! Resolution of loose caller identifiers into scoping tuples.
//!
//! The remote API requires a contract/group tuple to address most resource
//! families, but callers usually only know a resource name. Discovery
//! enumerates the tenant's contracts, then each contract's groups (both in
//! the order the remote API returns them), and probes the resource family
//! under every resulting context until a name match is found. Enumeration
//! order is the only tie-break.
//!
//! Successful resolutions are cached for 24 hours; failures are never
//! cached, since remote state may change.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::errors::{GatewayError, OrchestratorError, OrchestratorResult};
use crate::domain::models::{ContextHint, ResourceContext, TenantId};
use crate::domain::ports::{ApiGateway, ApiRequest};
use crate::services::cache::IntelligentCache;

/// Resolves loose identifiers into `ResourceContext` tuples.
pub struct ContextDiscovery {
    gateway: Arc<dyn ApiGateway>,
    cache: Arc<IntelligentCache>,
}

impl ContextDiscovery {
    pub fn new(gateway: Arc<dyn ApiGateway>, cache: Arc<IntelligentCache>) -> Self {
        Self { gateway, cache }
    }

    /// Resolve a hint for `family` (for example `"properties"` or `"zones"`).
    ///
    /// A fully specified hint is validated against the remote API and cached
    /// directly. Otherwise every (contract, group) combination is probed for
    /// the hinted name; exhausting all combinations yields `NotFound`.
    pub async fn resolve(
        &self,
        tenant: &TenantId,
        family: &str,
        hint: &ContextHint,
    ) -> OrchestratorResult<ResourceContext> {
        if let Some(context) = hint.to_context() {
            return self.validate_and_cache(tenant, family, hint, context).await;
        }

        let Some(name) = hint.name.as_deref() else {
            return Err(OrchestratorError::Validation {
                message: "context hint must carry either the full scoping tuple or a name".into(),
                diagnostics: Value::Null,
            });
        };

        let cache_key = Self::cache_key(family, name);
        if let Some(cached) = self.cache.get(tenant, &cache_key).await {
            if let Ok(context) = serde_json::from_value::<ResourceContext>(cached) {
                debug!(%tenant, family, name, "context resolved from cache");
                return Ok(context);
            }
        }

        let context = self.enumerate_and_probe(tenant, family, name).await?;
        self.cache
            .insert(
                tenant,
                &cache_key,
                serde_json::to_value(&context).unwrap_or(Value::Null),
                self.cache.context_ttl(),
            )
            .await;
        info!(%tenant, family, name, context = %context, "context resolved");
        Ok(context)
    }

    async fn validate_and_cache(
        &self,
        tenant: &TenantId,
        family: &str,
        hint: &ContextHint,
        context: ResourceContext,
    ) -> OrchestratorResult<ResourceContext> {
        let matched = self
            .probe(tenant, family, &context, hint.name.as_deref())
            .await?;
        if !matched {
            return Err(OrchestratorError::NotFound(format!(
                "no {family} visible under context {context}"
            )));
        }
        if let Some(name) = hint.name.as_deref() {
            self.cache
                .insert(
                    tenant,
                    &Self::cache_key(family, name),
                    serde_json::to_value(&context).unwrap_or(Value::Null),
                    self.cache.context_ttl(),
                )
                .await;
        }
        Ok(context)
    }

    async fn enumerate_and_probe(
        &self,
        tenant: &TenantId,
        family: &str,
        name: &str,
    ) -> OrchestratorResult<ResourceContext> {
        let contracts = self.list_ids(tenant, "/contracts", &[], "contractId").await?;

        for contract_id in &contracts {
            let groups = self
                .list_ids(
                    tenant,
                    "/groups",
                    &[("contractId", contract_id.as_str())],
                    "groupId",
                )
                .await?;

            for group_id in &groups {
                let context = ResourceContext::new(contract_id.clone(), group_id.clone());
                match self.probe(tenant, family, &context, Some(name)).await {
                    Ok(true) => return Ok(context),
                    Ok(false) => {}
                    // Some contexts are simply not visible to the caller's
                    // credential; keep scanning.
                    Err(OrchestratorError::Permission { .. })
                    | Err(OrchestratorError::NotFound(_))
                    | Err(OrchestratorError::Gateway(GatewayError::PermissionDenied { .. }))
                    | Err(OrchestratorError::Gateway(GatewayError::NotFound { .. })) => {
                        debug!(%tenant, %context, "context not visible, continuing enumeration");
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        Err(OrchestratorError::NotFound(format!(
            "no {family} named {name} found under any of {} contract(s) for tenant {tenant}",
            contracts.len()
        )))
    }

    /// Enumerate an id field from a list endpoint, preserving remote order.
    async fn list_ids(
        &self,
        tenant: &TenantId,
        path: &str,
        query: &[(&str, &str)],
        id_field: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let mut req = ApiRequest::get(tenant, path);
        for (k, v) in query {
            req = req.with_query(*k, *v);
        }
        let response = self.gateway.request(req).await?;
        Ok(Self::items(&response.body)
            .iter()
            .filter_map(|item| item.get(id_field).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Probe a resource family under one context. A positive match is an
    /// item whose name or id equals the hinted name; when no name is hinted,
    /// any visible item validates the context.
    async fn probe(
        &self,
        tenant: &TenantId,
        family: &str,
        context: &ResourceContext,
        name: Option<&str>,
    ) -> OrchestratorResult<bool> {
        let mut req = ApiRequest::get(tenant, format!("/{family}"))
            .with_query("contractId", context.contract_id.clone())
            .with_query("groupId", context.group_id.clone());
        if let Some(name) = name {
            req = req.with_query("name", name);
        }

        let response = self.gateway.request(req).await?;
        let items = Self::items(&response.body);
        let matched = match name {
            Some(name) => items.iter().any(|item| {
                item.get("name").and_then(Value::as_str) == Some(name)
                    || item.get("id").and_then(Value::as_str) == Some(name)
            }),
            None => !items.is_empty(),
        };
        Ok(matched)
    }

    fn items(body: &Value) -> Vec<Value> {
        body.get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn cache_key(family: &str, name: &str) -> String {
        format!("context:{family}:{name}")
    }
}
