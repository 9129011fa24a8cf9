mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use taxcollector::config::PipelineConfig;
use taxcollector::crawler::Outcome;
use taxcollector::storage::MemoryStorage;

use common::{property_url, service_with, FakeFetcher};

fn storage_with(urls: &[String], proxies: &[&str]) -> Arc<MemoryStorage> {
    let storage = MemoryStorage::with_proxies(proxies.iter().copied());
    storage.add_pending(urls.iter().cloned());
    Arc::new(storage)
}

fn config(pacing: Duration, backoff_min_ms: u64, backoff_max_ms: u64) -> PipelineConfig {
    PipelineConfig {
        workers: 1,
        pacing,
        backoff_min_ms,
        backoff_max_ms,
    }
}

#[tokio::test(start_paused = true)]
async fn worker_waits_out_pacing_between_jobs() {
    let urls = vec![property_url("1"), property_url("2"), property_url("3")];
    let storage = storage_with(&urls, &["10.0.0.1:8080"]);
    let fetcher = Arc::new(FakeFetcher::default());
    let pacing = Duration::from_secs(1);

    let start = Instant::now();
    let summary = service_with(config(pacing, 10, 100), &storage, &fetcher)
        .run(urls)
        .await
        .unwrap();

    assert_eq!(summary.retired, 3);
    let started = fetcher.started.lock().clone();
    assert_eq!(started.len(), 3);
    for pair in started.windows(2) {
        assert!(pair[1] - pair[0] >= pacing, "gap {:?}", pair[1] - pair[0]);
    }
    // The worker also pauses after its last job before the run drains.
    assert!(start.elapsed() >= pacing * 3);
}

#[tokio::test(start_paused = true)]
async fn proxy_failure_backs_off_within_range() {
    let url = property_url("2163");
    let storage = storage_with(&[url.clone()], &["10.0.0.9:3128"]);
    let fetcher = Arc::new(FakeFetcher::with_bad_proxies(["10.0.0.9:3128"]));

    let start = Instant::now();
    let summary = service_with(config(Duration::ZERO, 200, 300), &storage, &fetcher)
        .run(vec![url.clone()])
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(summary.report_for(&url).unwrap().outcome.is_failure());
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(300), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn detail_failure_does_not_back_off() {
    let url = property_url("2163");
    let storage = storage_with(&[url.clone()], &["10.0.0.1:8080"]);
    let fetcher = Arc::new(FakeFetcher::with_failing_urls([url.clone()]));

    let start = Instant::now();
    let summary = service_with(config(Duration::ZERO, 200, 300), &storage, &fetcher)
        .run(vec![url.clone()])
        .await
        .unwrap();

    assert!(matches!(
        summary.report_for(&url).unwrap().outcome,
        Outcome::Failed { .. }
    ));
    assert!(start.elapsed() < Duration::from_millis(200));
}
