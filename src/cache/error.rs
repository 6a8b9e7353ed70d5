//! Cache error types.
//!
//! `UpstreamError` wraps whatever a fetch closure failed with; it is cheap
//! to clone so a single failure can be broadcast to every coalesced waiter.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// An error raised by a fetch closure (network failure, non-2xx response,
/// malformed payload). Never retried by the cache itself.
#[derive(Debug, Clone, Error)]
#[error("{context}")]
pub struct UpstreamError {
    context: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl UpstreamError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            context: context.into(),
            source: Some(Arc::new(source)),
        }
    }
}

/// Errors surfaced to a foreground caller.
///
/// Background revalidation failures are absorbed and logged; they never
/// appear here.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The caller's own (or the coalesced initiator's) fetch failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// A non-initiating caller waited longer than the configured timeout
    /// for the in-flight fetch to complete. The initiator is unaffected.
    #[error("timed out after {timeout:?} waiting for in-flight fetch of `{key}`")]
    CoalesceTimeout { key: String, timeout: Duration },
}

impl CacheError {
    pub(crate) fn coalesce_timeout(key: impl Into<String>, timeout: Duration) -> Self {
        Self::CoalesceTimeout {
            key: key.into(),
            timeout,
        }
    }

    /// True for the locally recoverable waiter-timeout case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CoalesceTimeout { .. })
    }
}
