//! Cache orchestration.
//!
//! `CacheManager` makes a single decision per access: serve fresh, serve
//! stale while a background refresh runs, or fetch synchronously through
//! the coalescer. Classification happens on every access so a fixture that
//! went live since the last fetch is immediately re-tiered.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;

use super::coalescer::{CoalescerStats, RequestCoalescer};
use super::entry::{CacheMeta, CacheSource};
use super::error::{CacheError, UpstreamError};
use super::keys::QueryParams;
use super::lock::mutex_lock;
use super::policy::{DataCategory, RequestContext, TtlPolicy, classify};
use super::store::CacheStore;

const SOURCE: &str = "cache::manager";

const METRIC_HIT_FRESH: &str = "catenaccio_cache_hit_fresh_total";
const METRIC_HIT_STALE: &str = "catenaccio_cache_hit_stale_total";
const METRIC_MISS: &str = "catenaccio_cache_miss_total";
const METRIC_REVALIDATION: &str = "catenaccio_cache_revalidation_total";
const METRIC_REVALIDATION_FAILED: &str = "catenaccio_cache_revalidation_failed_total";

/// Classification inputs for one cache access.
#[derive(Debug, Clone)]
pub struct CacheRequest<'a> {
    endpoint: &'a str,
    params: &'a QueryParams,
    context: RequestContext,
    force_refresh: bool,
    live_match_window: bool,
}

impl<'a> CacheRequest<'a> {
    pub fn new(endpoint: &'a str, params: &'a QueryParams) -> Self {
        Self {
            endpoint,
            params,
            context: RequestContext::default(),
            force_refresh: false,
            live_match_window: false,
        }
    }

    /// Attach fixture context so match-scoped endpoints tier correctly.
    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Bypass the store entirely (concurrent force-refreshes still coalesce).
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Signal that matches in the relevant competition are currently live,
    /// which shortens the standings fresh TTL.
    pub fn live_match_window(mut self, live: bool) -> Self {
        self.live_match_window = live;
        self
    }
}

#[derive(Default)]
struct AccessCounters {
    hits_fresh: AtomicU64,
    hits_stale: AtomicU64,
    misses: AtomicU64,
    revalidations: AtomicU64,
}

/// Snapshot of cache activity for the operational surface.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits_fresh: u64,
    pub hits_stale: u64,
    pub misses: u64,
    pub revalidations: u64,
    pub hit_rate_percent: f64,
    pub revalidating_count: usize,
    pub coalescer: CoalescerStats,
}

/// Orchestrates classification, storage, coalescing, and background
/// revalidation behind one `get` call.
pub struct CacheManager<T> {
    store: Arc<CacheStore<T>>,
    coalescer: Arc<RequestCoalescer<T>>,
    revalidating: Arc<Mutex<HashSet<String>>>,
    revalidation_slots: Arc<Semaphore>,
    counters: Arc<AccessCounters>,
}

impl<T: Clone + Send + Sync + 'static> CacheManager<T> {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            store: Arc::new(CacheStore::new()),
            coalescer: Arc::new(RequestCoalescer::new(settings.coalesce_timeout())),
            revalidating: Arc::new(Mutex::new(HashSet::new())),
            revalidation_slots: Arc::new(Semaphore::new(settings.revalidation_workers_non_zero())),
            counters: Arc::new(AccessCounters::default()),
        }
    }

    /// Get data from cache or fetch it from upstream.
    ///
    /// Exactly one of four terminal branches applies per call:
    ///
    /// 1. forced refresh or miss — coalesced synchronous fetch, stored,
    ///    returned as `upstream`;
    /// 2. fresh hit — served immediately, no upstream call;
    /// 3. stale hit with SWR allowed — served immediately, background
    ///    revalidation enqueued, never blocking the caller;
    /// 4. expired (or stale without SWR) — treated as a miss.
    pub async fn get<F, Fut>(
        &self,
        key: &str,
        fetch: F,
        request: CacheRequest<'_>,
    ) -> Result<(T, CacheMeta), CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let category = classify(request.endpoint, request.params, &request.context);
        let policy = category.policy(request.live_match_window);

        if request.force_refresh {
            info!(key, %category, "force refresh, bypassing cache");
            return self.fetch_and_store(key, fetch, policy, category).await;
        }

        let Some(entry) = self.store.get(key) else {
            info!(key, %category, "cache miss");
            return self.fetch_and_store(key, fetch, policy, category).await;
        };

        if entry.is_fresh() {
            debug!(key, age = ?entry.age(), "cache hit (fresh)");
            self.counters.hits_fresh.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_HIT_FRESH).increment(1);
            let meta = CacheMeta::new(CacheSource::Fresh, category, policy.fresh_ttl, entry.age());
            return Ok((entry.value, meta));
        }

        if entry.is_usable_stale() && policy.allow_swr {
            info!(key, age = ?entry.age(), "cache hit (stale), revalidating in background");
            self.spawn_revalidation(key, fetch, policy, category);
            self.counters.hits_stale.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_HIT_STALE).increment(1);
            let meta = CacheMeta::new(CacheSource::Stale, category, policy.fresh_ttl, entry.age());
            return Ok((entry.value, meta));
        }

        info!(key, age = ?entry.age(), "cache expired");
        self.fetch_and_store(key, fetch, policy, category).await
    }

    /// Coalesce without caching: concurrent callers still share one
    /// upstream call, but nothing is stored.
    pub async fn get_uncached<F, Fut>(&self, key: &str, fetch: F) -> Result<(T, CacheMeta), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let value = self.coalescer.get_or_fetch(key, fetch).await?;
        Ok((value, CacheMeta::upstream_only()))
    }

    async fn fetch_and_store<F, Fut>(
        &self,
        key: &str,
        fetch: F,
        policy: TtlPolicy,
        category: DataCategory,
    ) -> Result<(T, CacheMeta), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let value = self.coalescer.get_or_fetch(key, fetch).await?;
        self.store.put(
            key,
            value.clone(),
            policy.fresh_ttl,
            policy.stale_ttl,
            category,
        );
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_MISS).increment(1);
        let meta = CacheMeta::new(CacheSource::Upstream, category, policy.fresh_ttl, Duration::ZERO);
        Ok((value, meta))
    }

    /// Enqueue a background refresh for a stale-but-usable entry.
    ///
    /// Idempotent per key: if a revalidation for `key` is already in flight
    /// (or queued for a pool slot), the call is a no-op. The refresh runs
    /// under a distinct `:revalidate` coalescing key so it never blocks
    /// concurrent foreground reads of the bare key.
    fn spawn_revalidation<F, Fut>(
        &self,
        key: &str,
        fetch: F,
        policy: TtlPolicy,
        category: DataCategory,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        {
            let mut revalidating = mutex_lock(&self.revalidating, SOURCE, "spawn_revalidation");
            if !revalidating.insert(key.to_string()) {
                debug!(key, "revalidation already in flight");
                return;
            }
        }

        let key = key.to_string();
        let store = self.store.clone();
        let coalescer = self.coalescer.clone();
        let revalidating = self.revalidating.clone();
        let counters = self.counters.clone();
        let slots = self.revalidation_slots.clone();

        tokio::spawn(async move {
            // Queue behind the bounded pool; the revalidating set keeps the
            // key deduplicated while this task waits for a slot.
            if let Ok(_permit) = slots.acquire_owned().await {
                let revalidate_key = format!("{key}:revalidate");
                match coalescer.get_or_fetch(&revalidate_key, fetch).await {
                    Ok(value) => {
                        store.put(&key, value, policy.fresh_ttl, policy.stale_ttl, category);
                        counters.revalidations.fetch_add(1, Ordering::Relaxed);
                        counter!(METRIC_REVALIDATION).increment(1);
                        debug!(key, "background revalidation complete");
                    }
                    Err(error) => {
                        // Absorbed: the stale entry keeps serving until its
                        // window truly lapses.
                        counter!(METRIC_REVALIDATION_FAILED).increment(1);
                        warn!(key, error = %error, "background revalidation failed, stale entry retained");
                    }
                }
            }
            mutex_lock(&revalidating, SOURCE, "revalidation_cleanup").remove(&key);
        });
    }

    // ========================================================================
    // Administrative surface
    // ========================================================================

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.store.invalidate(key)
    }

    /// Remove every entry whose key contains `pattern`. Returns the count.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.store.invalidate_pattern(pattern)
    }

    /// Drop all entries. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.store.clear()
    }

    pub fn stats(&self) -> CacheStats {
        let hits_fresh = self.counters.hits_fresh.load(Ordering::Relaxed);
        let hits_stale = self.counters.hits_stale.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total_hits = hits_fresh + hits_stale;
        let total = total_hits + misses;
        let hit_rate_percent = if total > 0 {
            (total_hits as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits_fresh,
            hits_stale,
            misses,
            revalidations: self.counters.revalidations.load(Ordering::Relaxed),
            hit_rate_percent,
            revalidating_count: mutex_lock(&self.revalidating, SOURCE, "stats").len(),
            coalescer: self.coalescer.stats(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for CacheManager<T> {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}
