//! TTL + LRU cache with tenant isolation and refresh-ahead.
//!
//! Entries live in per-tenant partitions so cross-tenant key collisions are
//! structurally impossible. Once an entry's age crosses a configurable
//! fraction of its TTL, the current reader still gets the cached value
//! immediately while a background reload replaces the entry on success;
//! reload failures leave the existing entry untouched and never propagate to
//! the in-flight reader. Expired entries are only ever visible through
//! [`IntelligentCache::get_stale`], the recovery engine's fallback path.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{CacheConfig, TenantId};

/// Async loader invoked on miss, expiry, forced refresh, and refresh-ahead.
pub type CacheLoader =
    Arc<dyn Fn() -> BoxFuture<'static, OrchestratorResult<Value>> + Send + Sync>;

/// Per-read options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheReadOptions {
    /// Bypass the cache entirely and write the fresh result back.
    pub force_refresh: bool,
}

struct Entry {
    value: Value,
    created: Instant,
    ttl: Duration,
    last_access: u64,
    refreshing: Arc<AtomicBool>,
}

impl Entry {
    fn age(&self) -> Duration {
        self.created.elapsed()
    }

    fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

#[derive(Default)]
struct Partition {
    entries: HashMap<String, Entry>,
}

impl Partition {
    /// Evict least-recently-used entries down to the cap.
    fn enforce_cap(&mut self, cap: usize) {
        while self.entries.len() > cap {
            let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            debug!(key = %victim, "evicting least-recently-used cache entry");
            self.entries.remove(&victim);
        }
    }
}

/// Tenant-partitioned TTL + LRU cache with refresh-ahead.
pub struct IntelligentCache {
    config: CacheConfig,
    partitions: Arc<RwLock<HashMap<TenantId, Partition>>>,
    /// Monotonic access stamp for LRU ordering.
    tick: Arc<AtomicU64>,
}

impl IntelligentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            partitions: Arc::new(RwLock::new(HashMap::new())),
            tick: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Default TTL for operation results.
    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl()
    }

    /// TTL for resolved scoping contexts.
    pub fn context_ttl(&self) -> Duration {
        self.config.context_ttl()
    }

    /// Read through the cache, loading on miss or expiry.
    pub async fn get_or_load(
        &self,
        tenant: &TenantId,
        key: &str,
        ttl: Duration,
        opts: CacheReadOptions,
        loader: CacheLoader,
    ) -> OrchestratorResult<Value> {
        if opts.force_refresh {
            let value = loader().await?;
            self.insert(tenant, key, value.clone(), ttl).await;
            return Ok(value);
        }

        if let Some(hit) = self.read_fresh(tenant, key, ttl, &loader).await {
            return Ok(hit);
        }

        // Miss or expired: load inline and replace on success.
        let value = loader().await?;
        self.insert(tenant, key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Return a fresh entry if present, scheduling refresh-ahead when the
    /// entry has entered the stale-but-usable window.
    async fn read_fresh(
        &self,
        tenant: &TenantId,
        key: &str,
        ttl: Duration,
        loader: &CacheLoader,
    ) -> Option<Value> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.get_mut(tenant)?;
        let entry = partition.entries.get_mut(key)?;
        if !entry.is_fresh() {
            return None;
        }

        entry.last_access = self.tick.fetch_add(1, Ordering::Relaxed);
        let value = entry.value.clone();

        let refresh_after = entry.ttl.mul_f64(self.config.refresh_ahead_fraction);
        if entry.age() >= refresh_after && !entry.refreshing.swap(true, Ordering::AcqRel) {
            self.spawn_refresh(tenant.clone(), key.to_string(), ttl, loader.clone(), entry.refreshing.clone());
        }

        Some(value)
    }

    fn spawn_refresh(
        &self,
        tenant: TenantId,
        key: String,
        ttl: Duration,
        loader: CacheLoader,
        refreshing: Arc<AtomicBool>,
    ) {
        let partitions = Arc::clone(&self.partitions);
        let tick = Arc::clone(&self.tick);
        let cap = self.config.max_entries_per_tenant;

        tokio::spawn(async move {
            match loader().await {
                Ok(value) => {
                    let mut partitions = partitions.write().await;
                    let partition = partitions.entry(tenant).or_default();
                    partition.entries.insert(
                        key,
                        Entry {
                            value,
                            created: Instant::now(),
                            ttl,
                            last_access: tick.fetch_add(1, Ordering::Relaxed),
                            refreshing: Arc::new(AtomicBool::new(false)),
                        },
                    );
                    partition.enforce_cap(cap);
                }
                Err(err) => {
                    // Keep serving the stale entry; the next expiry will
                    // force an inline reload.
                    warn!(key, error = %err, "refresh-ahead reload failed");
                    refreshing.store(false, Ordering::Release);
                }
            }
        });
    }

    /// Insert or replace an entry.
    pub async fn insert(&self, tenant: &TenantId, key: &str, value: Value, ttl: Duration) {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(tenant.clone()).or_default();
        partition.entries.insert(
            key.to_string(),
            Entry {
                value,
                created: Instant::now(),
                ttl,
                last_access: self.tick.fetch_add(1, Ordering::Relaxed),
                refreshing: Arc::new(AtomicBool::new(false)),
            },
        );
        partition.enforce_cap(self.config.max_entries_per_tenant);
    }

    /// Fresh-only lookup without loading.
    pub async fn get(&self, tenant: &TenantId, key: &str) -> Option<Value> {
        let mut partitions = self.partitions.write().await;
        let entry = partitions.get_mut(tenant)?.entries.get_mut(key)?;
        if !entry.is_fresh() {
            return None;
        }
        entry.last_access = self.tick.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Stale-tolerant lookup: returns the most recent value even past its
    /// TTL, with its age. Used by the recovery engine's cache fallback.
    pub async fn get_stale(&self, tenant: &TenantId, key: &str) -> Option<(Value, Duration)> {
        let partitions = self.partitions.read().await;
        let entry = partitions.get(tenant)?.entries.get(key)?;
        Some((entry.value.clone(), entry.age()))
    }

    /// Drop one entry.
    pub async fn invalidate(&self, tenant: &TenantId, key: &str) {
        let mut partitions = self.partitions.write().await;
        if let Some(partition) = partitions.get_mut(tenant) {
            partition.entries.remove(key);
        }
    }

    /// Drop a tenant's whole partition.
    pub async fn invalidate_tenant(&self, tenant: &TenantId) {
        let mut partitions = self.partitions.write().await;
        partitions.remove(tenant);
    }

    /// Entry count for one tenant.
    pub async fn len(&self, tenant: &TenantId) -> usize {
        let partitions = self.partitions.read().await;
        partitions.get(tenant).map_or(0, |p| p.entries.len())
    }

    pub async fn is_empty(&self, tenant: &TenantId) -> bool {
        self.len(tenant).await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn counting_loader(counter: Arc<AtomicU32>, value: Value) -> CacheLoader {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            let value = value.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        })
    }

    fn failing_loader(counter: Arc<AtomicU32>) -> CacheLoader {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(crate::domain::errors::OrchestratorError::NotFound(
                    "loader failed".into(),
                ))
            }
            .boxed()
        })
    }

    fn config(cap: usize) -> CacheConfig {
        CacheConfig {
            max_entries_per_tenant: cap,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_miss_loads_then_hit_skips_loader() {
        let cache = IntelligentCache::new(config(10));
        let tenant = TenantId::from("acme");
        let calls = Arc::new(AtomicU32::new(0));
        let loader = counting_loader(Arc::clone(&calls), json!({"v": 1}));

        let ttl = Duration::from_secs(60);
        let opts = CacheReadOptions::default();
        let v1 = cache
            .get_or_load(&tenant, "k", ttl, opts, loader.clone())
            .await
            .unwrap();
        let v2 = cache
            .get_or_load(&tenant, "k", ttl, opts, loader)
            .await
            .unwrap();

        assert_eq!(v1, v2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_never_returned() {
        let cache = IntelligentCache::new(config(10));
        let tenant = TenantId::from("acme");
        cache
            .insert(&tenant, "k", json!(1), Duration::from_millis(20))
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&tenant, "k").await.is_none());

        // get_or_load reloads instead of serving the corpse.
        let calls = Arc::new(AtomicU32::new(0));
        let loader = counting_loader(Arc::clone(&calls), json!(2));
        let v = cache
            .get_or_load(
                &tenant,
                "k",
                Duration::from_secs(60),
                CacheReadOptions::default(),
                loader,
            )
            .await
            .unwrap();
        assert_eq!(v, json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let cache = IntelligentCache::new(config(10));
        let tenant = TenantId::from("acme");
        cache
            .insert(&tenant, "k", json!("old"), Duration::from_secs(60))
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let loader = counting_loader(Arc::clone(&calls), json!("new"));
        let v = cache
            .get_or_load(
                &tenant,
                "k",
                Duration::from_secs(60),
                CacheReadOptions {
                    force_refresh: true,
                },
                loader,
            )
            .await
            .unwrap();

        assert_eq!(v, json!("new"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Fresh result written back
        assert_eq!(cache.get(&tenant, "k").await, Some(json!("new")));
    }

    #[tokio::test]
    async fn test_refresh_ahead_serves_stale_and_replaces_in_background() {
        let mut cfg = config(10);
        cfg.refresh_ahead_fraction = 0.5;
        let cache = IntelligentCache::new(cfg);
        let tenant = TenantId::from("acme");
        let ttl = Duration::from_millis(200);

        cache.insert(&tenant, "k", json!("v1"), ttl).await;
        // Enter the stale-but-usable window (past 50% of ttl, before expiry).
        tokio::time::sleep(Duration::from_millis(120)).await;

        let calls = Arc::new(AtomicU32::new(0));
        let loader = counting_loader(Arc::clone(&calls), json!("v2"));
        let v = cache
            .get_or_load(&tenant, "k", ttl, CacheReadOptions::default(), loader)
            .await
            .unwrap();
        // In-flight reader gets the stale value immediately.
        assert_eq!(v, json!("v1"));

        // Background reload replaces the entry.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&tenant, "k").await, Some(json!("v2")));
    }

    #[tokio::test]
    async fn test_refresh_ahead_failure_keeps_existing_entry() {
        let mut cfg = config(10);
        cfg.refresh_ahead_fraction = 0.5;
        let cache = IntelligentCache::new(cfg);
        let tenant = TenantId::from("acme");
        let ttl = Duration::from_millis(300);

        cache.insert(&tenant, "k", json!("v1"), ttl).await;
        tokio::time::sleep(Duration::from_millis(160)).await;

        let calls = Arc::new(AtomicU32::new(0));
        let loader = failing_loader(Arc::clone(&calls));
        let v = cache
            .get_or_load(&tenant, "k", ttl, CacheReadOptions::default(), loader)
            .await
            .unwrap();
        assert_eq!(v, json!("v1"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Still within ttl and untouched by the failed reload.
        assert_eq!(cache.get(&tenant, "k").await, Some(json!("v1")));
    }

    #[tokio::test]
    async fn test_lru_eviction_respects_cap() {
        let cache = IntelligentCache::new(config(2));
        let tenant = TenantId::from("acme");
        let ttl = Duration::from_secs(60);

        cache.insert(&tenant, "a", json!(1), ttl).await;
        cache.insert(&tenant, "b", json!(2), ttl).await;
        // Touch "a" so "b" becomes the LRU victim.
        cache.get(&tenant, "a").await;
        cache.insert(&tenant, "c", json!(3), ttl).await;

        assert_eq!(cache.len(&tenant).await, 2);
        assert!(cache.get(&tenant, "a").await.is_some());
        assert!(cache.get(&tenant, "b").await.is_none());
        assert!(cache.get(&tenant, "c").await.is_some());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let cache = IntelligentCache::new(config(10));
        let acme = TenantId::from("acme");
        let umbrella = TenantId::from("umbrella");
        let ttl = Duration::from_secs(60);

        cache.insert(&acme, "k", json!("acme-secret"), ttl).await;
        assert!(cache.get(&umbrella, "k").await.is_none());

        cache.insert(&umbrella, "k", json!("umbrella"), ttl).await;
        assert_eq!(cache.get(&acme, "k").await, Some(json!("acme-secret")));
    }

    #[tokio::test]
    async fn test_get_stale_returns_expired_values() {
        let cache = IntelligentCache::new(config(10));
        let tenant = TenantId::from("acme");
        cache
            .insert(&tenant, "k", json!("old"), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(&tenant, "k").await.is_none());
        let (value, age) = cache.get_stale(&tenant, "k").await.unwrap();
        assert_eq!(value, json!("old"));
        assert!(age >= Duration::from_millis(10));
    }
}
