//! Cache entry data model.
//!
//! `CacheEntry` carries the opaque payload plus the TTL configuration that
//! was in effect when it was fetched. Freshness is never stored: it is
//! recomputed from the clock on every read, so expiry is evaluated lazily
//! on access and no sweeper is needed.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;

use super::policy::DataCategory;

/// Where the returned value came from, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    /// Served from cache within the fresh TTL.
    Fresh,
    /// Served from cache past the fresh TTL while a background refresh runs.
    Stale,
    /// Fetched from the upstream API on this access.
    Upstream,
}

impl CacheSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Upstream => "upstream",
        }
    }
}

/// A cached value with the staleness bookkeeping for one key.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
    pub fresh_ttl: Duration,
    pub stale_ttl: Duration,
    pub category: DataCategory,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fresh_ttl: Duration, stale_ttl: Duration, category: DataCategory) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            fresh_ttl,
            stale_ttl,
            category,
        }
    }

    /// Time since the value was fetched, sampled now.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.fresh_ttl
    }

    /// Past the fresh TTL but still inside the stale grace window.
    pub fn is_usable_stale(&self) -> bool {
        let age = self.age();
        age >= self.fresh_ttl && age < self.fresh_ttl + self.stale_ttl
    }

    pub fn is_expired(&self) -> bool {
        self.age() >= self.fresh_ttl + self.stale_ttl
    }

    pub fn source(&self) -> CacheSource {
        if self.is_fresh() {
            CacheSource::Fresh
        } else if self.is_usable_stale() {
            CacheSource::Stale
        } else {
            CacheSource::Upstream
        }
    }
}

/// Per-access metadata returned alongside cached data, shaped for embedding
/// in a JSON API response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMeta {
    /// RFC 3339 UTC timestamp of this access (not of the underlying fetch).
    pub last_updated: String,
    pub cache_source: CacheSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DataCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<f64>,
}

impl CacheMeta {
    pub fn new(
        source: CacheSource,
        category: DataCategory,
        fresh_ttl: Duration,
        age: Duration,
    ) -> Self {
        Self {
            last_updated: now_rfc3339(),
            cache_source: source,
            category: Some(category),
            ttl_seconds: Some(fresh_ttl.as_secs()),
            age_seconds: Some(age.as_secs_f64()),
        }
    }

    /// Meta for the uncached path: upstream source, no diagnostics.
    pub fn upstream_only() -> Self {
        Self {
            last_updated: now_rfc3339(),
            cache_source: CacheSource::Upstream,
            category: None,
            ttl_seconds: None,
            age_seconds: None,
        }
    }

    /// Response-embedding shape: top-level `lastUpdated`/`cacheSource`,
    /// diagnostics tucked under a `_debug` object when present.
    pub fn to_json(&self) -> serde_json::Value {
        let mut meta = serde_json::json!({
            "lastUpdated": self.last_updated,
            "cacheSource": self.cache_source.as_str(),
        });
        if let Some(category) = self.category {
            meta["_debug"] = serde_json::json!({
                "category": category.as_str(),
                "ttl": self.ttl_seconds,
                "age": self.age_seconds.map(|age| (age * 10.0).round() / 10.0),
            });
        }
        meta
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
