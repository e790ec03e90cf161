//! Refresh Lifecycle Tests
//!
//! Drives the background loop on a paused clock: start, periodic ticks,
//! stop and restart, overlapping refreshes, and the two error classes.

use mirror_cache::{Cache, Field, RefreshConfig};
use mirror_test_utils::{assertions, fixtures, FetchError, Place, ScriptedFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

type PlaceFetcher = Arc<ScriptedFetcher<Place>>;

const TICK: Duration = Duration::from_millis(100);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn place_cache(fetcher: &PlaceFetcher) -> Cache<PlaceFetcher> {
    Cache::new(Arc::clone(fetcher), fixtures::place_id())
        .group(fixtures::region_city())
        .interval(TICK)
        .expect("non-zero interval")
}

/// City field that cannot be resolved on records with an empty city.
fn strict_city() -> Field<Place> {
    Field::optional("city", |p: &Place| {
        (!p.city.is_empty()).then(|| p.city.clone().into())
    })
}

async fn wait_for_generation(cache: &Cache<PlaceFetcher>, generation: u64) {
    while cache.generation() < generation {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// START / TICK
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_performs_initial_refresh() {
    init_tracing();
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();

    assert!(cache.is_running());
    assert_eq!(fetcher.started(), 1);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("3").unwrap().city, "Boston");
    assert_eq!(cache.get_by_group(&["EU", "Paris"]).ids(), ["2"]);
    cache.stop();
}

#[tokio::test(start_paused = true)]
async fn test_ticks_refresh_at_interval() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();

    sleep(TICK * 3 + TICK / 2).await;

    assert_eq!(fetcher.started(), 4);
    assert_eq!(cache.generation(), 4);
    assert_eq!(cache.metrics().refreshes, 4);
    cache.stop();
}

#[tokio::test(start_paused = true)]
async fn test_source_changes_visible_after_tick() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();
    let pinned = cache.snapshot();

    fetcher.set(vec![Place::new("9", "EU", "Berlin")]);
    sleep(TICK + TICK / 2).await;

    assert_eq!(cache.len(), 1);
    assert!(cache.get("1").is_none());
    assert_eq!(cache.get_by_group(&["EU", "Berlin"]).ids(), ["9"]);
    assert!(cache.get_by_group(&["US"]).is_empty());

    // A snapshot taken earlier is unaffected by the swap.
    assert_eq!(pinned.len(), 3);
    assert_eq!(pinned.get_by_group(&["EU", "Berlin"]).ids(), ["1"]);
    cache.stop();
}

// ============================================================================
// STOP / RESTART
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_halts_ticking() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();

    sleep(TICK * 2 + TICK / 2).await;
    assert_eq!(fetcher.started(), 3);

    cache.stop();
    assert!(!cache.is_running());
    sleep(TICK * 10).await;

    assert_eq!(fetcher.started(), 3);
    // Data stays readable after stopping.
    assert_eq!(cache.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_twice_keeps_single_loop() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();
    let again = cache.run().await.unwrap();
    assert!(Arc::ptr_eq(&cache, &again));
    assert_eq!(fetcher.started(), 1);

    sleep(TICK * 3 + TICK / 2).await;

    assert_eq!(fetcher.started(), 4);
    cache.stop();
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();

    sleep(TICK + TICK / 2).await;
    assert_eq!(fetcher.started(), 2);

    cache.stop();
    cache.run().await.unwrap();
    assert!(cache.is_running());
    assert_eq!(fetcher.started(), 3);

    sleep(TICK + TICK / 2).await;

    // Only the new loop ticks.
    assert_eq!(fetcher.started(), 4);
    cache.stop();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_cache_ends_loop() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();
    let weak = Arc::downgrade(&cache);

    drop(cache);
    sleep(TICK * 5).await;

    assert!(weak.upgrade().is_none());
    assert_eq!(fetcher.started(), 1);
}

// ============================================================================
// OVERLAP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ticks_during_slow_fetch_are_skipped() {
    let fetcher = Arc::new(ScriptedFetcher::gated(fixtures::sample_places()));
    fetcher.release(1);
    let cache = place_cache(&fetcher).start().await.unwrap();
    assert_eq!(cache.generation(), 1);

    // First tick parks at the gate.
    sleep(TICK + TICK / 2).await;
    assert_eq!(fetcher.started(), 2);
    assert!(cache.is_refreshing());

    // Three more ticks land while it is parked.
    sleep(TICK * 3).await;
    assert_eq!(fetcher.started(), 2);
    assert_eq!(cache.metrics().skipped, 3);

    fetcher.set(vec![Place::new("8", "US", "Lima")]);
    fetcher.release(1);
    wait_for_generation(&cache, 2).await;

    assert!(!cache.is_refreshing());
    assert_eq!(cache.get("8").unwrap().city, "Lima");
    cache.stop();
}

// ============================================================================
// ERRORS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_initial_fetch_error_still_starts() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    fetcher.push_err(FetchError::unavailable("places", "connection refused"));

    let cache = place_cache(&fetcher).start().await.unwrap();
    assert!(cache.is_running());
    assert!(cache.is_empty());

    sleep(TICK + TICK / 2).await;

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.metrics().fetch_errors, 1);
    cache.stop();
}

#[tokio::test(start_paused = true)]
async fn test_fetch_errors_keep_snapshot_and_loop() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = place_cache(&fetcher).start().await.unwrap();

    fetcher.fail_with(FetchError::query("timeout"));
    sleep(TICK * 2 + TICK / 2).await;

    assert!(cache.is_running());
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.generation(), 1);
    assert_eq!(cache.metrics().fetch_errors, 2);

    fetcher.set(vec![Place::new("4", "APAC", "Tokyo")]);
    sleep(TICK).await;

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get_by_group(&["APAC", "Tokyo"]).ids(), ["4"]);
    cache.stop();
}

#[tokio::test(start_paused = true)]
async fn test_initial_config_error_fails_run() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let result = Cache::new(Arc::clone(&fetcher), fixtures::place_id())
        .group([fixtures::missing_field()])
        .start()
        .await;

    assertions::assert_fatal(&result);
    assert_eq!(fetcher.started(), 1);

    sleep(TICK * 5).await;
    assert_eq!(fetcher.started(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_error_stops_loop() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let cache = Cache::new(Arc::clone(&fetcher), fixtures::place_id())
        .group([strict_city()])
        .interval(TICK)
        .unwrap()
        .start()
        .await
        .unwrap();

    fetcher.set(vec![Place::new("5", "EU", "")]);
    sleep(TICK + TICK / 2).await;

    assert!(!cache.is_running());
    assert_eq!(cache.metrics().config_errors, 1);
    // Previous snapshot is still served.
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get_by_group(&["Berlin"]).ids(), ["1"]);

    sleep(TICK * 5).await;
    assert_eq!(fetcher.started(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_config_error_tolerated_when_configured() {
    let fetcher = Arc::new(ScriptedFetcher::new(fixtures::sample_places()));
    let config = RefreshConfig::new()
        .with_interval(TICK)
        .with_stop_on_config_error(false);
    let cache = Cache::with_config(Arc::clone(&fetcher), fixtures::place_id(), config)
        .unwrap()
        .group([strict_city()])
        .start()
        .await
        .unwrap();

    fetcher.set(vec![Place::new("5", "EU", "")]);
    sleep(TICK * 2 + TICK / 2).await;

    assert!(cache.is_running());
    assert_eq!(cache.metrics().config_errors, 2);
    assert_eq!(cache.len(), 3);
    cache.stop();
}
