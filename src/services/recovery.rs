//! Failure classification and adaptive recovery.
//!
//! Classification is a pure function of the failure's status and remote
//! code. Each class owns a static, ordered list of default strategies; the
//! engine re-ranks candidates by an exponentially-weighted success rate
//! learned per `(class, strategy)` pair, with ties falling back to static
//! order. The stats table is naturally bounded by the taxonomy (classes x
//! strategies) and every attempt's outcome is folded in before control
//! returns to the caller.

use futures::Future;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{ErrorClass, RetryConfig, StrategyKind, StrategyStat, TenantId};
use crate::domain::ports::RecoveryStatsStore;
use crate::services::cache::IntelligentCache;

/// Metadata about the call being recovered.
#[derive(Debug, Clone)]
pub struct CallMeta {
    /// Whether re-issuing the call is side-effect free.
    pub idempotent: bool,
    /// Cache key of this call's result, for the cache-fallback strategy.
    /// Read paths only.
    pub cache_key: Option<String>,
}

impl CallMeta {
    pub fn read(cache_key: impl Into<String>) -> Self {
        Self {
            idempotent: true,
            cache_key: Some(cache_key.into()),
        }
    }

    pub fn write() -> Self {
        Self {
            idempotent: false,
            cache_key: None,
        }
    }
}

/// A recovered value, tagged when it was served from a stale cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovered {
    Fresh(Value),
    /// Most recent cached value; potentially stale.
    Stale(Value),
}

impl Recovered {
    pub fn into_value(self) -> Value {
        match self {
            Self::Fresh(v) | Self::Stale(v) => v,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Classifies failures, selects recovery strategies, and tracks their
/// empirical success rates.
pub struct RecoveryEngine {
    config: RetryConfig,
    alternate_tenant: Option<TenantId>,
    cache: Arc<IntelligentCache>,
    stats: Arc<RwLock<HashMap<(ErrorClass, StrategyKind), StrategyStat>>>,
    store: Option<Arc<dyn RecoveryStatsStore>>,
}

impl RecoveryEngine {
    pub fn new(
        config: RetryConfig,
        cache: Arc<IntelligentCache>,
        alternate_tenant: Option<TenantId>,
    ) -> Self {
        Self {
            config,
            alternate_tenant,
            cache,
            stats: Arc::new(RwLock::new(HashMap::new())),
            store: None,
        }
    }

    /// Attach a durable backend for the stats table.
    pub fn with_store(mut self, store: Arc<dyn RecoveryStatsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load persisted strategy statistics, if a store is attached.
    pub async fn load_stats(&self) -> OrchestratorResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let records = store.load().await?;
        let mut stats = self.stats.write().await;
        for record in records {
            stats.insert((record.class, record.strategy), record);
        }
        Ok(())
    }

    /// Classify an error in the fixed taxonomy.
    pub fn classify(error: &OrchestratorError) -> ErrorClass {
        error.classification()
    }

    /// Static default strategy order for a class.
    fn default_strategies(&self, class: ErrorClass) -> Vec<StrategyKind> {
        use StrategyKind::{AccountSwitch, CacheFallback, RetryWithBackoff, Surface};
        match class {
            ErrorClass::RateLimited | ErrorClass::TransientServer | ErrorClass::Timeout => {
                vec![RetryWithBackoff, Surface]
            }
            ErrorClass::ServiceUnavailable => vec![CacheFallback, RetryWithBackoff, Surface],
            ErrorClass::PermissionDenied => {
                if self.alternate_tenant.is_some() {
                    vec![AccountSwitch, Surface]
                } else {
                    vec![Surface]
                }
            }
            ErrorClass::Validation | ErrorClass::Conflict | ErrorClass::Unknown => vec![Surface],
        }
    }

    /// Re-rank candidates by learned success rate; ties (and unseen pairs,
    /// which get a neutral prior) keep the static order.
    pub async fn select_strategies(&self, class: ErrorClass) -> Vec<StrategyKind> {
        let candidates = self.default_strategies(class);
        let stats = self.stats.read().await;
        let mut ranked: Vec<(usize, StrategyKind, f64)> = candidates
            .into_iter()
            .enumerate()
            .map(|(idx, strategy)| {
                let rate = stats
                    .get(&(class, strategy))
                    .map_or(0.5, |s| s.success_rate);
                (idx, strategy, rate)
            })
            .collect();
        // Stable order: higher success rate first, static position breaks ties.
        ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(_, strategy, _)| strategy).collect()
    }

    /// Fold one strategy outcome into the stats table.
    pub async fn record_outcome(
        &self,
        class: ErrorClass,
        strategy: StrategyKind,
        success: bool,
        latency: Duration,
    ) {
        {
            let mut stats = self.stats.write().await;
            let stat = stats
                .entry((class, strategy))
                .or_insert_with(|| StrategyStat::new(class, strategy));
            stat.observe(success, latency.as_millis() as u64, self.config.ewma_alpha);
        }

        if let Some(store) = &self.store {
            let snapshot = self.stats_snapshot().await;
            if let Err(err) = store.save(&snapshot).await {
                warn!(error = %err, "failed to persist recovery statistics");
            }
        }
    }

    /// Current stats table, for observability and persistence.
    pub async fn stats_snapshot(&self) -> Vec<StrategyStat> {
        let stats = self.stats.read().await;
        stats.values().cloned().collect()
    }

    /// Run `call` under the recovery policy.
    ///
    /// `call` receives the tenant to execute under, so the account-switch
    /// strategy can re-issue it with the alternate credential.
    pub async fn execute<F, Fut>(
        &self,
        tenant: &TenantId,
        meta: &CallMeta,
        call: F,
    ) -> OrchestratorResult<Recovered>
    where
        F: Fn(TenantId) -> Fut,
        Fut: Future<Output = OrchestratorResult<Value>>,
    {
        let first_error = match call(tenant.clone()).await {
            Ok(value) => return Ok(Recovered::Fresh(value)),
            Err(err) => err,
        };

        let class = Self::classify(&first_error);
        debug!(class = class.as_str(), error = %first_error, "entering recovery");

        let mut skipped: Vec<StrategyKind> = Vec::new();
        let mut retried = false;
        let mut last_error = first_error;

        for strategy in self.select_strategies(class).await {
            match strategy {
                StrategyKind::RetryWithBackoff => {
                    if !meta.idempotent {
                        skipped.push(strategy);
                        continue;
                    }
                    retried = true;
                    match self.retry_with_backoff(tenant, class, &call).await {
                        Ok(value) => return Ok(Recovered::Fresh(value)),
                        Err(err) => last_error = err,
                    }
                }
                StrategyKind::CacheFallback => {
                    if !meta.idempotent {
                        skipped.push(strategy);
                        continue;
                    }
                    let Some(key) = meta.cache_key.as_deref() else {
                        skipped.push(strategy);
                        continue;
                    };
                    let started = Instant::now();
                    if let Some((value, age)) = self.cache.get_stale(tenant, key).await {
                        self.record_outcome(class, strategy, true, started.elapsed())
                            .await;
                        warn!(
                            key,
                            age_ms = age.as_millis() as u64,
                            "serving potentially stale cached value"
                        );
                        return Ok(Recovered::Stale(value));
                    }
                    self.record_outcome(class, strategy, false, started.elapsed())
                        .await;
                }
                StrategyKind::AccountSwitch => {
                    let Some(alternate) = self.alternate_tenant.clone() else {
                        skipped.push(strategy);
                        continue;
                    };
                    debug!(%alternate, "retrying under alternate tenant credential");
                    let started = Instant::now();
                    match call(alternate).await {
                        Ok(value) => {
                            self.record_outcome(class, strategy, true, started.elapsed())
                                .await;
                            return Ok(Recovered::Fresh(value));
                        }
                        Err(err) => {
                            self.record_outcome(class, strategy, false, started.elapsed())
                                .await;
                            last_error = err;
                        }
                    }
                }
                StrategyKind::Surface => break,
            }
        }

        Err(Self::surface(
            class,
            last_error,
            &skipped,
            retried,
            self.config.max_retries,
        ))
    }

    async fn retry_with_backoff<F, Fut>(
        &self,
        tenant: &TenantId,
        class: ErrorClass,
        call: &F,
    ) -> OrchestratorResult<Value>
    where
        F: Fn(TenantId) -> Fut,
        Fut: Future<Output = OrchestratorResult<Value>>,
    {
        let mut last_error: Option<OrchestratorError> = None;

        for attempt in 0..self.config.max_retries {
            let delay = self.backoff_delay(attempt);
            debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "backing off before retry"
            );
            sleep(delay).await;

            let started = Instant::now();
            match call(tenant.clone()).await {
                Ok(value) => {
                    self.record_outcome(class, StrategyKind::RetryWithBackoff, true, started.elapsed())
                        .await;
                    return Ok(value);
                }
                Err(err) => {
                    self.record_outcome(
                        class,
                        StrategyKind::RetryWithBackoff,
                        false,
                        started.elapsed(),
                    )
                    .await;
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(OrchestratorError::Unknown {
            message: "retry budget exhausted without an attempt".into(),
            suggestion: None,
            diagnostics: Value::Null,
        }))
    }

    /// Exponential delay: `initial * 2^attempt`, capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .config
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.config.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Build the caller-facing error, attaching skipped strategies as
    /// suggestions.
    fn surface(
        class: ErrorClass,
        error: OrchestratorError,
        skipped: &[StrategyKind],
        retried: bool,
        max_retries: u32,
    ) -> OrchestratorError {
        let error = if class == ErrorClass::RateLimited && retried {
            let diagnostics = match &error {
                OrchestratorError::Gateway(g) => g.diagnostics(),
                _ => Value::Null,
            };
            OrchestratorError::RateLimited {
                attempts: max_retries + 1,
                diagnostics,
            }
        } else {
            error
        };

        if skipped.is_empty() {
            return error;
        }
        let hints: Vec<&str> = skipped.iter().map(StrategyKind::as_str).collect();
        let hint = match class {
            ErrorClass::PermissionDenied => format!(
                "{}: configure an alternate tenant credential to enable automatic recovery",
                hints.join(", ")
            ),
            _ => format!("unexecuted recovery strategies: {}", hints.join(", ")),
        };
        error.with_suggestion(hint)
    }
}
