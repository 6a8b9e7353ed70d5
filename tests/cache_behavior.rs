//! End-to-end behavior of the cache façade.
//!
//! Drives the public API the way an API-client layer does: JSON payloads
//! keyed by endpoint + normalized params, concurrent access through the
//! coalescer, stale-while-revalidate, and the administrative surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use catenaccio::cache::{
    CacheManager, CacheRequest, CacheSource, DataCategory, QueryParams, RequestContext,
    UpstreamError, cache_key, classify,
};

fn manager() -> Arc<CacheManager<Value>> {
    Arc::new(CacheManager::default())
}

fn slow_fetch(
    calls: &Arc<AtomicUsize>,
    payload: Value,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<Value, UpstreamError>> + Send>>
+ Send
+ 'static {
    let calls = calls.clone();
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(payload)
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_coalesce_into_one_fetch() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut params = QueryParams::new();
    params.set("league", 39).set("season", 2024);
    let key = cache_key("standings", &params);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        let fetch = slow_fetch(&calls, json!({"league": "Premier League"}));
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let params = {
                let mut params = QueryParams::new();
                params.set("league", 39).set("season", 2024);
                params
            };
            manager
                .get(&key, fetch, CacheRequest::new("standings", &params))
                .await
        }));
    }

    for handle in handles {
        let (value, meta) = handle.await.expect("task").expect("fetch succeeds");
        assert_eq!(value["league"], "Premier League");
        assert_eq!(meta.cache_source, CacheSource::Upstream);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "one upstream call for all callers");
    assert_eq!(manager.stats().entries, 1);
}

#[tokio::test(start_paused = true)]
async fn upstream_failure_reaches_every_coalesced_caller() {
    let manager = manager();
    let mut params = QueryParams::new();
    params.set("id", 874);
    let key = cache_key("players", &params);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let manager = manager.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let params = {
                let mut params = QueryParams::new();
                params.set("id", 874);
                params
            };
            manager
                .get(
                    &key,
                    || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<Value, _>(UpstreamError::new("rate limited"))
                    },
                    CacheRequest::new("players", &params),
                )
                .await
        }));
    }

    for handle in handles {
        let error = handle.await.expect("task").expect_err("error propagates");
        assert_eq!(error.to_string(), "rate limited");
    }
    assert_eq!(manager.stats().entries, 0);
}

#[test]
fn classifier_matches_documented_examples() {
    let mut fixture = QueryParams::new();
    fixture.set("id", 5);
    assert_eq!(
        classify(
            "fixtures",
            &fixture,
            &RequestContext::with_fixture_status("1H")
        ),
        DataCategory::LiveMatch
    );
    assert_eq!(
        classify(
            "fixtures",
            &fixture,
            &RequestContext::with_fixture_status("FT")
        ),
        DataCategory::StableMetadata
    );

    let mut standings = QueryParams::new();
    standings.set("league", 39).set("season", 2024);
    assert_eq!(
        classify("standings", &standings, &RequestContext::default()),
        DataCategory::Standings
    );

    let mut team = QueryParams::new();
    team.set("id", 42);
    assert_eq!(
        classify("teams", &team, &RequestContext::default()),
        DataCategory::StableMetadata
    );

    let mut league_teams = QueryParams::new();
    league_teams.set("league", 39);
    assert_eq!(
        classify("teams", &league_teams, &RequestContext::default()),
        DataCategory::TeamSeasonStats
    );
}

#[tokio::test(start_paused = true)]
async fn live_window_shortens_standings_revalidation_cycle() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut params = QueryParams::new();
    params.set("league", 39).set("season", 2024);
    let key = cache_key("standings", &params);

    let request = || {
        let mut params = QueryParams::new();
        params.set("league", 39).set("season", 2024);
        params
    };

    let fetch = slow_fetch(&calls, json!({"rank": 1}));
    manager
        .get(&key, fetch, CacheRequest::new("standings", &request()).live_match_window(true))
        .await
        .expect("miss fetch succeeds");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 61s is already past the shortened 60s live fresh TTL, but far inside
    // the normal 120s one.
    tokio::time::advance(Duration::from_secs(61)).await;
    let fetch = slow_fetch(&calls, json!({"rank": 1}));
    let (_, meta) = manager
        .get(&key, fetch, CacheRequest::new("standings", &request()).live_match_window(true))
        .await
        .expect("stale hit succeeds");
    assert_eq!(meta.cache_source, CacheSource::Stale);

    // Let the background revalidation drain.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(manager.stats().revalidations, 1);
}

#[tokio::test(start_paused = true)]
async fn admin_surface_invalidates_by_key_and_pattern() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    for (endpoint, id) in [("players", 874), ("players", 875)] {
        let mut params = QueryParams::new();
        params.set("id", id);
        let key = cache_key(endpoint, &params);
        let fetch = slow_fetch(&calls, json!({"id": id}));
        manager
            .get(&key, fetch, CacheRequest::new(endpoint, &params))
            .await
            .expect("fetch succeeds");
    }
    let mut standings = QueryParams::new();
    standings.set("league", 39);
    let standings_key = cache_key("standings", &standings);
    let fetch = slow_fetch(&calls, json!({"rank": 1}));
    manager
        .get(&standings_key, fetch, CacheRequest::new("standings", &standings))
        .await
        .expect("fetch succeeds");

    assert_eq!(manager.stats().entries, 3);

    // Pattern invalidation takes out the players family only.
    assert_eq!(manager.invalidate_pattern("players"), 2);
    assert_eq!(manager.stats().entries, 1);

    // Idempotent single-key invalidation.
    assert!(manager.invalidate(&standings_key));
    assert!(!manager.invalidate(&standings_key));
    assert_eq!(manager.stats().entries, 0);

    // Next access is a miss again.
    let fetch = slow_fetch(&calls, json!({"rank": 1}));
    let (_, meta) = manager
        .get(&standings_key, fetch, CacheRequest::new("standings", &standings))
        .await
        .expect("fetch succeeds");
    assert_eq!(meta.cache_source, CacheSource::Upstream);
}

#[tokio::test(start_paused = true)]
async fn uncached_requests_coalesce_without_storing() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        let fetch = slow_fetch(&calls, json!({"status": "ok"}));
        handles.push(tokio::spawn(async move {
            manager.get_uncached("status:ping", fetch).await
        }));
    }

    for handle in handles {
        let (value, meta) = handle.await.expect("task").expect("fetch succeeds");
        assert_eq!(value["status"], "ok");
        assert_eq!(meta.cache_source, CacheSource::Upstream);
        assert!(meta.ttl_seconds.is_none());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn clear_drops_every_entry() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));

    for league in [39, 140, 78] {
        let mut params = QueryParams::new();
        params.set("league", league);
        let key = cache_key("standings", &params);
        let fetch = slow_fetch(&calls, json!({"league": league}));
        manager
            .get(&key, fetch, CacheRequest::new("standings", &params))
            .await
            .expect("fetch succeeds");
    }

    assert_eq!(manager.clear(), 3);
    assert_eq!(manager.stats().entries, 0);
    assert_eq!(manager.clear(), 0);
}
