//! Catenaccio — tiered caching for rate-limited football data APIs.
//!
//! The crate sits between an in-process caller (typically an HTTP handler
//! layer) and a rate-limited upstream API, and decides on every access
//! whether to serve cached data, serve stale data while refreshing it in
//! the background, or fetch synchronously:
//!
//! - [`cache::CacheManager`] — the orchestration entry point
//! - [`cache::RequestCoalescer`] — one upstream call per key, shared by all
//!   concurrent callers
//! - [`cache::CacheStore`] — keyed entry storage with lazy expiry
//! - [`cache::policy`] — endpoint classification and the per-category TTL
//!   table
//! - [`upstream::RequestLimiter`] — process-wide cap on concurrent outbound
//!   requests, wrapped around every fetch closure
//!
//! ## Usage
//!
//! ```ignore
//! let manager: CacheManager<serde_json::Value> = CacheManager::new(&settings.cache);
//! let limiter = RequestLimiter::new(settings.upstream.max_concurrent_requests);
//!
//! let mut params = QueryParams::new();
//! params.set("league", 39);
//! params.set("season", 2024);
//! let key = cache_key("standings", &params);
//!
//! let (value, meta) = manager
//!     .get(&key, || async move { limiter.run(|| api.standings(39, 2024)).await }, CacheRequest::new("standings", &params))
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod infra;
pub mod upstream;
