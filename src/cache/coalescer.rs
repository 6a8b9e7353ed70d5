//! Request coalescing.
//!
//! When several callers ask for the same cache key at once, only the first
//! performs the upstream fetch; the rest attach to the in-flight request
//! and receive the same result (or the same error). Coalescing is keyed,
//! so unrelated requests never block each other, and the fetch itself runs
//! outside the in-flight map's lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use metrics::histogram;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::error::{CacheError, UpstreamError};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::coalescer";

const METRIC_UPSTREAM_FETCH_MS: &str = "catenaccio_upstream_fetch_ms";

/// One in-progress upstream fetch that concurrent callers share.
struct InFlight<T> {
    /// One-shot broadcast flipped to `true` when the result slot is filled.
    done: watch::Sender<bool>,
    slot: OnceLock<Result<T, UpstreamError>>,
    started_at: Instant,
    waiters: AtomicUsize,
}

impl<T> InFlight<T> {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            done,
            slot: OnceLock::new(),
            started_at: Instant::now(),
            waiters: AtomicUsize::new(0),
        }
    }
}

/// Coalescer diagnostics, exposed through the cache stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct CoalescerStats {
    pub active_requests: usize,
    pub active_keys: Vec<String>,
}

/// Deduplicates concurrent fetches per cache key.
///
/// For any key, at most one fetch is outstanding at a time; every caller
/// that arrives while it runs becomes a waiter on the shared result. A
/// waiter that outlives the configured timeout fails on its own without
/// disturbing the initiator.
pub struct RequestCoalescer<T> {
    in_flight: Mutex<HashMap<String, Arc<InFlight<T>>>>,
    timeout: Duration,
}

enum Role<T> {
    Initiator(Arc<InFlight<T>>),
    Waiter(Arc<InFlight<T>>),
}

/// Resolves the flight when the initiator finishes or is dropped mid-fetch.
///
/// Dropping without a filled slot (the initiating future was cancelled)
/// resolves every waiter with an error instead of leaving them to burn the
/// full wait timeout against a fetch that will never complete.
struct FlightGuard<'a, T: Clone> {
    coalescer: &'a RequestCoalescer<T>,
    key: String,
    flight: Arc<InFlight<T>>,
}

impl<T: Clone> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        let _ = self
            .flight
            .slot
            .set(Err(UpstreamError::new("fetch aborted before completing")));
        self.flight.done.send_replace(true);
        mutex_lock(&self.coalescer.in_flight, SOURCE, "flight_cleanup").remove(&self.key);
    }
}

impl<T: Clone> RequestCoalescer<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Join an existing in-flight fetch for `key` or initiate a new one.
    ///
    /// The initiator's error is propagated identically to every waiter. A
    /// waiter additionally fails with [`CacheError::CoalesceTimeout`] if
    /// the initiator has not finished within the configured timeout.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let role = {
            let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "get_or_fetch");
            match in_flight.get(key) {
                Some(flight) => {
                    let waiters = flight.waiters.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(key, waiters, "joining in-flight fetch");
                    Role::Waiter(flight.clone())
                }
                None => {
                    let flight = Arc::new(InFlight::new());
                    in_flight.insert(key.to_string(), flight.clone());
                    debug!(key, "initiating upstream fetch");
                    Role::Initiator(flight)
                }
            }
        };

        match role {
            Role::Initiator(flight) => {
                let guard = FlightGuard {
                    coalescer: self,
                    key: key.to_string(),
                    flight: flight.clone(),
                };

                // The fetch runs outside the map lock so other keys proceed.
                let outcome = fetch().await;
                let _ = guard.flight.slot.set(outcome.clone());
                drop(guard);

                let elapsed_ms = flight.started_at.elapsed().as_secs_f64() * 1000.0;
                histogram!(METRIC_UPSTREAM_FETCH_MS).record(elapsed_ms);

                if let Err(error) = &outcome {
                    warn!(key, error = %error, "upstream fetch failed");
                }
                outcome.map_err(CacheError::from)
            }
            Role::Waiter(flight) => {
                let mut done = flight.done.subscribe();
                match timeout(self.timeout, done.wait_for(|done| *done)).await {
                    Ok(Ok(_)) => match flight.slot.get() {
                        Some(Ok(value)) => Ok(value.clone()),
                        Some(Err(error)) => Err(CacheError::Upstream(error.clone())),
                        // Protocol: the slot is always filled before the
                        // signal fires.
                        None => Err(CacheError::Upstream(UpstreamError::new(
                            "in-flight fetch resolved without a result",
                        ))),
                    },
                    Ok(Err(_)) => Err(CacheError::Upstream(UpstreamError::new(
                        "in-flight fetch was abandoned",
                    ))),
                    Err(_) => {
                        warn!(key, wait = ?self.timeout, "timed out waiting for in-flight fetch");
                        Err(CacheError::coalesce_timeout(key, self.timeout))
                    }
                }
            }
        }
    }

    /// Number of keys with a fetch currently in flight.
    pub fn active_requests(&self) -> usize {
        mutex_lock(&self.in_flight, SOURCE, "active_requests").len()
    }

    pub fn stats(&self) -> CoalescerStats {
        let in_flight = mutex_lock(&self.in_flight, SOURCE, "stats");
        CoalescerStats {
            active_requests: in_flight.len(),
            active_keys: in_flight.keys().cloned().collect(),
        }
    }
}
