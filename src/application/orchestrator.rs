//! Top-level orchestrator wiring the services behind one execution surface.
//!
//! Callers register operation handlers, then drive everything through
//! `execute` and `execute_bulk`. The orchestrator owns the cross-cutting
//! machinery: read results flow through the tenant-partitioned cache, every
//! remote call a handler makes is circuit-breaker guarded, and failures pass
//! through the recovery engine before they reach the caller.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    ActivationResult, BulkJob, ContextHint, Network, OperationConfig, OperationKind, OperationSpec,
    OrchestratorConfig, ResourceContext, StrategyStat, TenantId,
};
use crate::domain::ports::{ApiGateway, ApiRequest, ApiResponse, RecoveryStatsStore};
use crate::services::cache::{CacheLoader, CacheReadOptions, IntelligentCache};
use crate::services::changeset::{ChangeSetCoordinator, ChangeSetHandle, ChangeSetOutcome};
use crate::services::circuit_breaker::{CircuitBreakerRegistry, CircuitStats};
use crate::services::context_discovery::ContextDiscovery;
use crate::services::recovery::{CallMeta, RecoveryEngine};
use crate::services::{ActivationEngine, BulkExecutor, BulkWorker, ProgressFn};

/// Execution environment handed to operation handlers.
///
/// All remote access goes through [`OperationContext::request`], which keys
/// the circuit breaker by method and resource-family path segment.
#[derive(Clone)]
pub struct OperationContext {
    tenant: TenantId,
    gateway: Arc<dyn ApiGateway>,
    breaker: Arc<CircuitBreakerRegistry>,
    discovery: Arc<ContextDiscovery>,
}

impl OperationContext {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Issue a remote call under circuit breaker protection.
    pub async fn request(&self, req: ApiRequest) -> OrchestratorResult<ApiResponse> {
        let key = req.operation_key();
        self.breaker
            .guard(&key, async { Ok(self.gateway.request(req).await?) })
            .await
    }

    /// Resolve a loose hint into a scoping context for `family`.
    pub async fn resolve_context(
        &self,
        family: &str,
        hint: &ContextHint,
    ) -> OrchestratorResult<ResourceContext> {
        self.discovery.resolve(&self.tenant, family, hint).await
    }
}

/// One registered operation.
#[async_trait::async_trait]
pub trait OperationHandler: Send + Sync {
    fn spec(&self) -> &OperationSpec;

    async fn run(&self, ctx: &OperationContext, params: Value) -> OrchestratorResult<Value>;
}

/// Registry of operations by stable identifier.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn OperationHandler>>>,
}

impl OperationRegistry {
    pub async fn register(&self, handler: Arc<dyn OperationHandler>) {
        let id = handler.spec().id.clone();
        debug!(operation = %id, "registering operation handler");
        self.handlers.write().await.insert(id, handler);
    }

    pub async fn get(&self, id: &str) -> OrchestratorResult<Arc<dyn OperationHandler>> {
        self.handlers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("no operation registered as {id}")))
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Result of a single `execute` call.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub value: Value,
    /// The value came from an expired cache entry via recovery fallback.
    pub stale: bool,
}

/// Facade over the full orchestration stack.
pub struct Orchestrator {
    gateway: Arc<dyn ApiGateway>,
    cache: Arc<IntelligentCache>,
    breaker: Arc<CircuitBreakerRegistry>,
    recovery: Arc<RecoveryEngine>,
    discovery: Arc<ContextDiscovery>,
    changesets: Arc<ChangeSetCoordinator>,
    activation: Arc<ActivationEngine>,
    bulk: Arc<BulkExecutor>,
    registry: OperationRegistry,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, gateway: Arc<dyn ApiGateway>) -> Self {
        Self::build(config, gateway, None)
    }

    /// Like `new`, with a durable backend for recovery statistics.
    pub fn with_stats_store(
        config: OrchestratorConfig,
        gateway: Arc<dyn ApiGateway>,
        store: Arc<dyn RecoveryStatsStore>,
    ) -> Self {
        Self::build(config, gateway, Some(store))
    }

    fn build(
        config: OrchestratorConfig,
        gateway: Arc<dyn ApiGateway>,
        store: Option<Arc<dyn RecoveryStatsStore>>,
    ) -> Self {
        let cache = Arc::new(IntelligentCache::new(config.cache.clone()));
        let breaker = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
        let mut recovery = RecoveryEngine::new(
            config.retry.clone(),
            Arc::clone(&cache),
            config.alternate_tenant.clone().map(TenantId::new),
        );
        if let Some(store) = store {
            recovery = recovery.with_store(store);
        }
        let discovery = Arc::new(ContextDiscovery::new(
            Arc::clone(&gateway),
            Arc::clone(&cache),
        ));
        let changesets = Arc::new(ChangeSetCoordinator::new(
            Arc::clone(&gateway),
            &config.activation,
        ));
        let activation = Arc::new(ActivationEngine::new(
            Arc::clone(&gateway),
            config.activation.clone(),
        ));
        let bulk = Arc::new(BulkExecutor::new(config.bulk.clone()));

        Self {
            gateway,
            cache,
            breaker,
            recovery: Arc::new(recovery),
            discovery,
            changesets,
            activation,
            bulk,
            registry: OperationRegistry::default(),
        }
    }

    /// Restore persisted recovery statistics, if a store was attached.
    pub async fn load_recovery_stats(&self) -> OrchestratorResult<()> {
        self.recovery.load_stats().await
    }

    pub async fn register(&self, handler: Arc<dyn OperationHandler>) {
        self.registry.register(handler).await;
    }

    pub async fn operations(&self) -> Vec<String> {
        self.registry.ids().await
    }

    /// Execute one registered operation for a tenant.
    ///
    /// Reads go through the cache keyed by operation id and parameters; a
    /// cached value makes no remote call. Writes always reach the remote
    /// system and invalidate the tenant's cache partition on success. Both
    /// paths run under the recovery policy.
    pub async fn execute(
        &self,
        tenant: &TenantId,
        operation_id: &str,
        params: Value,
        opts: &OperationConfig,
    ) -> OrchestratorResult<OperationOutcome> {
        let handler = self.registry.get(operation_id).await?;
        let spec = handler.spec().clone();
        debug!(%tenant, operation = %spec.id, kind = ?spec.kind, "executing operation");

        match spec.kind {
            OperationKind::Read => self.execute_read(tenant, handler, params, opts).await,
            OperationKind::Write => self.execute_write(tenant, handler, params, opts).await,
        }
    }

    async fn execute_read(
        &self,
        tenant: &TenantId,
        handler: Arc<dyn OperationHandler>,
        params: Value,
        opts: &OperationConfig,
    ) -> OrchestratorResult<OperationOutcome> {
        let key = Self::result_key(&handler.spec().id, &params);
        let ttl = opts.cache_ttl.unwrap_or(self.cache.default_ttl());
        let read_opts = CacheReadOptions {
            force_refresh: opts.force_refresh,
        };
        let meta = CallMeta::read(key.clone());

        let cache = Arc::clone(&self.cache);
        let recovered = self
            .recovery
            .execute(tenant, &meta, |call_tenant| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                let loader = self.loader_for(&call_tenant, Arc::clone(&handler), params.clone());
                async move {
                    cache
                        .get_or_load(&call_tenant, &key, ttl, read_opts, loader)
                        .await
                }
            })
            .await?;

        Ok(OperationOutcome {
            stale: recovered.is_stale(),
            value: recovered.into_value(),
        })
    }

    async fn execute_write(
        &self,
        tenant: &TenantId,
        handler: Arc<dyn OperationHandler>,
        params: Value,
        _opts: &OperationConfig,
    ) -> OrchestratorResult<OperationOutcome> {
        let meta = CallMeta::write();
        let recovered = self
            .recovery
            .execute(tenant, &meta, |call_tenant| {
                let ctx = self.context_for(&call_tenant);
                let handler = Arc::clone(&handler);
                let params = params.clone();
                async move { handler.run(&ctx, params).await }
            })
            .await?;

        // Remote state changed; cached reads for this tenant are suspect.
        self.cache.invalidate_tenant(tenant).await;

        Ok(OperationOutcome {
            stale: false,
            value: recovered.into_value(),
        })
    }

    /// Execute one operation across many parameter sets with bounded
    /// concurrency. Per-item recovery and caching behave exactly as in
    /// `execute`.
    pub async fn execute_bulk(
        self: Arc<Self>,
        tenant: &TenantId,
        operation_id: &str,
        items: Vec<Value>,
        opts: &OperationConfig,
        progress: Option<ProgressFn>,
    ) -> OrchestratorResult<BulkJob> {
        // Fail before spawning anything if the operation is unknown.
        self.registry.get(operation_id).await?;
        info!(%tenant, operation = operation_id, items = items.len(), "starting bulk execution");

        let worker: BulkWorker = {
            let orchestrator = Arc::clone(&self);
            let tenant = tenant.clone();
            let operation_id = operation_id.to_string();
            let opts = opts.clone();
            Arc::new(move |item: Value| {
                let orchestrator = Arc::clone(&orchestrator);
                let tenant = tenant.clone();
                let operation_id = operation_id.clone();
                let opts = opts.clone();
                Box::pin(async move {
                    orchestrator
                        .execute(&tenant, &operation_id, item, &opts)
                        .await
                        .map(|outcome| outcome.value)
                })
            })
        };

        self.bulk.execute(items, opts, worker, progress).await
    }

    /// Resolve a loose hint into a scoping context.
    pub async fn resolve_context(
        &self,
        tenant: &TenantId,
        family: &str,
        hint: &ContextHint,
    ) -> OrchestratorResult<ResourceContext> {
        self.discovery.resolve(tenant, family, hint).await
    }

    /// Run a staged mutation workflow under an exclusive scope lease.
    pub async fn with_change_set<R, F>(
        &self,
        tenant: &TenantId,
        scope: &str,
        f: F,
    ) -> OrchestratorResult<ChangeSetOutcome<R>>
    where
        F: FnOnce(&mut ChangeSetHandle) -> OrchestratorResult<R>,
    {
        self.changesets.with_change_set(tenant, scope, f).await
    }

    /// Activate a resource version on a network.
    pub async fn activate(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
        network: Network,
        opts: &OperationConfig,
    ) -> OrchestratorResult<ActivationResult> {
        self.activation
            .activate(tenant, family, resource_id, version, network, opts)
            .await
    }

    /// Clone-if-active helper for mutation flows.
    pub async fn prepare_mutable_version(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
    ) -> OrchestratorResult<u64> {
        self.activation
            .prepare_mutable_version(tenant, family, resource_id, version)
            .await
    }

    /// Circuit breaker snapshot across all operation keys.
    pub async fn circuit_stats(&self) -> Vec<CircuitStats> {
        self.breaker.stats().await
    }

    /// Learned recovery strategy statistics.
    pub async fn recovery_stats(&self) -> Vec<StrategyStat> {
        self.recovery.stats_snapshot().await
    }

    fn context_for(&self, tenant: &TenantId) -> OperationContext {
        OperationContext {
            tenant: tenant.clone(),
            gateway: Arc::clone(&self.gateway),
            breaker: Arc::clone(&self.breaker),
            discovery: Arc::clone(&self.discovery),
        }
    }

    fn loader_for(
        &self,
        tenant: &TenantId,
        handler: Arc<dyn OperationHandler>,
        params: Value,
    ) -> CacheLoader {
        let ctx = self.context_for(tenant);
        Arc::new(move || {
            let ctx = ctx.clone();
            let handler = Arc::clone(&handler);
            let params = params.clone();
            Box::pin(async move { handler.run(&ctx, params).await })
        })
    }

    /// Cache key for an operation result. The cache is already partitioned
    /// by tenant, so the key only carries operation identity and parameters.
    fn result_key(operation_id: &str, params: &Value) -> String {
        format!("op:{operation_id}:{params}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::GatewayError;
    use crate::domain::models::OrchestratorConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gateway that fails a configurable number of times per path before
    /// succeeding.
    struct FlakyGateway {
        calls: AtomicU32,
        failures_before_success: u32,
        status_on_failure: u16,
    }

    impl FlakyGateway {
        fn reliable() -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures_before_success: 0,
                status_on_failure: 500,
            }
        }

        fn failing(failures: u32, status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures_before_success: failures,
                status_on_failure: status,
            }
        }
    }

    #[async_trait]
    impl ApiGateway for FlakyGateway {
        async fn request(&self, req: ApiRequest) -> Result<ApiResponse, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                return Err(GatewayError::from_status(
                    self.status_on_failure,
                    json!({"detail": "induced"}),
                ));
            }
            Ok(ApiResponse {
                status: 200,
                body: json!({"path": req.path, "tenant": req.tenant.to_string()}),
            })
        }
    }

    struct EchoRead;

    #[async_trait]
    impl OperationHandler for EchoRead {
        fn spec(&self) -> &OperationSpec {
            static SPEC: std::sync::OnceLock<OperationSpec> = std::sync::OnceLock::new();
            SPEC.get_or_init(|| OperationSpec::read("record.get", "records"))
        }

        async fn run(&self, ctx: &OperationContext, params: Value) -> OrchestratorResult<Value> {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("?");
            let response = ctx.request(ApiRequest::get(ctx.tenant(), format!("/records/{name}"))).await?;
            Ok(response.body)
        }
    }

    struct EchoWrite;

    #[async_trait]
    impl OperationHandler for EchoWrite {
        fn spec(&self) -> &OperationSpec {
            static SPEC: std::sync::OnceLock<OperationSpec> = std::sync::OnceLock::new();
            SPEC.get_or_init(|| OperationSpec::write("record.put", "records"))
        }

        async fn run(&self, ctx: &OperationContext, params: Value) -> OrchestratorResult<Value> {
            let response = ctx
                .request(ApiRequest::put(ctx.tenant(), "/records/x", params))
                .await?;
            Ok(response.body)
        }
    }

    fn fast_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.retry.initial_backoff_ms = 5;
        config.retry.max_backoff_ms = 20;
        config
    }

    async fn orchestrator(gateway: Arc<FlakyGateway>) -> Arc<Orchestrator> {
        let orchestrator = Arc::new(Orchestrator::new(fast_config(), gateway));
        orchestrator.register(Arc::new(EchoRead)).await;
        orchestrator.register(Arc::new(EchoWrite)).await;
        orchestrator
    }

    #[tokio::test]
    async fn test_read_results_are_cached_per_tenant() {
        let gateway = Arc::new(FlakyGateway::reliable());
        let orchestrator = orchestrator(gateway.clone()).await;
        let tenant = TenantId::from("acme");
        let params = json!({"name": "www"});

        let first = orchestrator
            .execute(&tenant, "record.get", params.clone(), &OperationConfig::default())
            .await
            .unwrap();
        let second = orchestrator
            .execute(&tenant, "record.get", params.clone(), &OperationConfig::default())
            .await
            .unwrap();
        assert_eq!(first.value, second.value);
        assert!(!second.stale);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);

        // A different tenant never sees the cached value.
        let other = TenantId::from("globex");
        orchestrator
            .execute(&other, "record.get", params, &OperationConfig::default())
            .await
            .unwrap();
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_to_success() {
        let gateway = Arc::new(FlakyGateway::failing(2, 500));
        let orchestrator = orchestrator(gateway.clone()).await;
        let tenant = TenantId::from("acme");

        let outcome = orchestrator
            .execute(
                &tenant,
                "record.get",
                json!({"name": "www"}),
                &OperationConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.value["path"], "/records/www");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_writes_invalidate_cached_reads() {
        let gateway = Arc::new(FlakyGateway::reliable());
        let orchestrator = orchestrator(gateway.clone()).await;
        let tenant = TenantId::from("acme");
        let params = json!({"name": "www"});

        orchestrator
            .execute(&tenant, "record.get", params.clone(), &OperationConfig::default())
            .await
            .unwrap();
        orchestrator
            .execute(&tenant, "record.put", json!({"ttl": 60}), &OperationConfig::default())
            .await
            .unwrap();
        orchestrator
            .execute(&tenant, "record.get", params, &OperationConfig::default())
            .await
            .unwrap();

        // get, put, then a fresh get because the write invalidated the cache.
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let gateway = Arc::new(FlakyGateway::reliable());
        let orchestrator = orchestrator(gateway).await;
        let tenant = TenantId::from("acme");

        let err = orchestrator
            .execute(&tenant, "no.such.op", Value::Null, &OperationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_repeated_failures_open_the_circuit() {
        let gateway = Arc::new(FlakyGateway::failing(u32::MAX, 500));
        let orchestrator = orchestrator(gateway).await;
        let tenant = TenantId::from("acme");

        // Each execute makes several attempts through retry; enough rounds
        // push the breaker past its threshold.
        for _ in 0..3 {
            let _ = orchestrator
                .execute(
                    &tenant,
                    "record.get",
                    json!({"name": "www"}),
                    &OperationConfig::default().with_force_refresh(),
                )
                .await;
        }

        let stats = orchestrator.circuit_stats().await;
        let circuit = stats
            .iter()
            .find(|s| s.operation == "GET /records")
            .expect("circuit for records reads");
        assert!(circuit.consecutive_failures >= 5 || circuit.open_count > 0);
    }

    #[tokio::test]
    async fn test_bulk_execution_reports_per_item_results() {
        let gateway = Arc::new(FlakyGateway::reliable());
        let orchestrator = orchestrator(gateway).await;
        let tenant = TenantId::from("acme");

        let items: Vec<Value> = (0..4).map(|n| json!({"name": format!("host{n}")})).collect();
        let job = orchestrator
            .execute_bulk(
                &tenant,
                "record.get",
                items,
                &OperationConfig::default(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(job.len(), 4);
        assert_eq!(job.failed, 0);
        assert_eq!(job.items[3].result.as_ref().unwrap()["path"], "/records/host3");
    }
}
