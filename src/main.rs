use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use taxcollector::config::Config;
use taxcollector::crawler::{HttpFetcher, ScrapingService};
use taxcollector::identity::IdentityProvider;
use taxcollector::random::SharedRng;
use taxcollector::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env()?;

    let rng = Arc::new(SharedRng::from_entropy());
    let identities = Arc::new(IdentityProvider::load(&cfg.user_agents_path, Arc::clone(&rng)).await?);
    let storage = Arc::new(Storage::new(&cfg.database_url, cfg.max_connections).await?);
    let fetcher = Arc::new(HttpFetcher::new(
        cfg.session_url.clone(),
        cfg.search_referer.clone(),
        cfg.fetch_timeout,
    ));

    let urls = storage.pending_urls(cfg.url_limit).await?;
    info!(count = urls.len(), "Loaded pending urls");

    let service = ScrapingService::new(
        cfg.pipeline.clone(),
        storage.clone(),
        identities,
        fetcher,
        storage,
        rng,
    );

    let summary = service.run(urls).await?;

    for report in &summary.reports {
        println!(
            "worker: {}   job: {}   propertyID: {}   outcome: {}",
            report.worker_id, report.job_id, report.property_id, report.outcome
        );
    }

    Ok(())
}
