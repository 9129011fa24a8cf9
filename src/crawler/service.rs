use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::job::{parse_property_id, raw_property_id, Job, JobState, Outcome};
use crate::crawler::parser;
use crate::error::JobError;
use crate::identity::IdentityProvider;
use crate::proxy::ProxyRotator;
use crate::random::SharedRng;
use crate::storage::PropertyStore;

/// Final line for one job.
#[derive(Debug)]
pub struct JobReport {
    pub worker_id: usize,
    pub job_id: usize,
    pub url: String,
    pub property_id: String,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub retired: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// URLs the dispatcher dropped because they carry no property id.
    pub skipped: Vec<String>,
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    pub fn report_for(&self, url: &str) -> Option<&JobReport> {
        self.reports.iter().find(|r| r.url == url)
    }
}

#[derive(Clone)]
pub struct ScrapingService {
    cfg: PipelineConfig,
    proxies: Arc<dyn ProxyRotator>,
    identities: Arc<IdentityProvider>,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn PropertyStore>,
    rng: Arc<SharedRng>,
}

type StepError = (JobState, JobError);

fn at<E: Into<JobError>>(step: JobState) -> impl FnOnce(E) -> StepError {
    move |e| (step, e.into())
}

impl ScrapingService {
    pub fn new(
        cfg: PipelineConfig,
        proxies: Arc<dyn ProxyRotator>,
        identities: Arc<IdentityProvider>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn PropertyStore>,
        rng: Arc<SharedRng>,
    ) -> Self {
        Self {
            cfg,
            proxies,
            identities,
            fetcher,
            store,
            rng,
        }
    }

    /// Runs every URL through the worker pool and returns once all results
    /// are collected. Completion order is not input order.
    pub async fn run(&self, urls: Vec<String>) -> anyhow::Result<RunSummary> {
        let workers = self.cfg.workers.max(1);
        info!(urls = urls.len(), workers, "Starting scrape");

        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Job>();

        let dispatcher = tokio::spawn(dispatch(urls, job_tx));

        let mut pool = JoinSet::new();
        for worker_id in 1..=workers {
            let svc = self.clone();
            let rx = Arc::clone(&job_rx);
            let tx = result_tx.clone();
            pool.spawn(async move { svc.work(worker_id, rx, tx).await });
        }
        // The results channel closes once the last worker drops its sender.
        drop(result_tx);

        let mut summary = RunSummary::default();
        while let Some(job) = result_rx.recv().await {
            collect(&mut summary, job);
        }

        summary.skipped = dispatcher.await?;
        while let Some(res) = pool.join_next().await {
            res?;
        }

        info!(
            retired = summary.retired,
            duplicates = summary.duplicates,
            failed = summary.failed,
            skipped = summary.skipped.len(),
            "Scrape finished"
        );
        Ok(summary)
    }

    async fn work(
        &self,
        worker_id: usize,
        jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
        results: mpsc::UnboundedSender<Job>,
    ) {
        loop {
            let next = jobs.lock().await.recv().await;
            let Some(mut job) = next else {
                break;
            };

            job.worker_id = worker_id;
            self.process(&mut job).await;

            if results.send(job).is_err() {
                warn!(worker = worker_id, "Result collector gone, stopping worker");
                break;
            }

            if !self.cfg.pacing.is_zero() {
                sleep(self.cfg.pacing).await;
            }
        }
    }

    /// Drives one job to a terminal outcome.
    pub async fn process(&self, job: &mut Job) {
        let outcome = match self.advance(job).await {
            Ok(outcome) => outcome,
            Err((step, error)) => Outcome::Failed { step, error },
        };
        job.outcome = Some(outcome);
    }

    async fn advance(&self, job: &mut Job) -> Result<Outcome, StepError> {
        let property_id = parse_property_id(&job.raw_id).ok_or_else(|| {
            (
                JobState::IdParsed,
                JobError::InvalidId {
                    url: job.url.clone(),
                },
            )
        })?;
        job.property_id = Some(property_id);
        job.enter(JobState::IdParsed);

        let exists = self
            .store
            .exists(property_id)
            .await
            .map_err(at(JobState::DedupChecked))?;
        job.enter(JobState::DedupChecked);

        if exists {
            self.store.retire(&job.url).await.map_err(at(JobState::Retired))?;
            return Ok(Outcome::Duplicate);
        }

        let proxy = self
            .proxies
            .acquire()
            .await
            .map_err(at(JobState::ProxyAcquired))?;
        job.proxy = Some(proxy.clone());
        job.enter(JobState::ProxyAcquired);

        let identity = self
            .identities
            .random()
            .map_err(at(JobState::IdentityAcquired))?;
        job.identity = Some(identity.clone());
        job.enter(JobState::IdentityAcquired);

        let body = match self.fetcher.fetch(&job.url, &proxy, &identity).await {
            Ok(body) => body,
            Err(e) if e.is_proxy_failure() => {
                warn!(worker = job.worker_id, job = job.job_id, proxy = %proxy.address, "Bad proxy");
                if let Err(be) = self.proxies.blacklist(&proxy.address).await {
                    warn!(proxy = %proxy.address, error = %be, "Failed to blacklist proxy");
                }
                sleep(self.rng.backoff(self.cfg.backoff_min_ms, self.cfg.backoff_max_ms)).await;
                return Err((JobState::SessionWarmed, e.into()));
            }
            Err(e) => {
                job.enter(JobState::SessionWarmed);
                return Err((JobState::DetailFetched, e.into()));
            }
        };
        job.enter(JobState::SessionWarmed);
        job.enter(JobState::DetailFetched);

        let mut record = parser::extract(&body);
        record.property_id = property_id;
        job.body = Some(body);
        job.enter(JobState::Extracted);

        self.store.persist(&record).await.map_err(at(JobState::Persisted))?;
        job.record = Some(record);
        job.enter(JobState::Persisted);

        self.store.retire(&job.url).await.map_err(at(JobState::Retired))?;
        job.enter(JobState::Retired);

        Ok(Outcome::Retired)
    }
}

/// Emits one job per URL that carries a property id, in input order.
/// Returns the URLs it had to drop.
async fn dispatch(urls: Vec<String>, jobs: mpsc::UnboundedSender<Job>) -> Vec<String> {
    let mut skipped = Vec::new();

    for (job_id, url) in urls.into_iter().enumerate() {
        let raw_id = raw_property_id(&url);
        if raw_id.is_empty() {
            warn!(job = job_id, url = %url, "No property id in url, skipping");
            skipped.push(url);
            continue;
        }
        if jobs.send(Job::new(job_id, url, raw_id)).is_err() {
            break;
        }
    }

    skipped
}

fn collect(summary: &mut RunSummary, job: Job) {
    let Some(outcome) = job.outcome else {
        warn!(worker = job.worker_id, job = job.job_id, "Job returned without an outcome");
        summary.failed += 1;
        return;
    };

    match &outcome {
        Outcome::Retired => summary.retired += 1,
        Outcome::Duplicate => summary.duplicates += 1,
        Outcome::Failed { .. } => summary.failed += 1,
    }

    if outcome.is_failure() {
        warn!(
            worker = job.worker_id,
            job = job.job_id,
            property_id = %job.raw_id,
            outcome = %outcome,
            "Job result"
        );
    } else {
        info!(
            worker = job.worker_id,
            job = job.job_id,
            property_id = %job.raw_id,
            outcome = %outcome,
            "Job result"
        );
    }

    summary.reports.push(JobReport {
        worker_id: job.worker_id,
        job_id: job.job_id,
        url: job.url,
        property_id: job.raw_id,
        outcome,
    });
}
