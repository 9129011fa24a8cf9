use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

pub const DEFAULT_SESSION_URL: &str = "https://propaccess.trueautomation.com/clientdb/?cid=56";
pub const DEFAULT_SEARCH_REFERER: &str =
    "https://propaccess.trueautomation.com/clientdb/SearchResults.aspx?cid=56";

pub struct Config {
    pub database_url: String,
    pub user_agents_path: String,
    pub session_url: String,
    pub search_referer: String,
    pub fetch_timeout: Duration,
    pub max_connections: u32,
    pub url_limit: Option<i64>,
    pub pipeline: PipelineConfig,
}

/// Knobs the worker pool reads.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Delay after each job, per worker.
    pub pacing: Duration,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            pacing: Duration::from_secs(1),
            backoff_min_ms: 10,
            backoff_max_ms: 100,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            bail!("WORKERS must be at least 1");
        }
        if self.backoff_min_ms >= self.backoff_max_ms {
            bail!(
                "BACKOFF_MIN_MS ({}) must be below BACKOFF_MAX_MS ({})",
                self.backoff_min_ms,
                self.backoff_max_ms
            );
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            workers: optional("WORKERS")?.unwrap_or(defaults.workers),
            pacing: Duration::from_millis(optional("PACING_MS")?.unwrap_or(1000)),
            backoff_min_ms: optional("BACKOFF_MIN_MS")?.unwrap_or(defaults.backoff_min_ms),
            backoff_max_ms: optional("BACKOFF_MAX_MS")?.unwrap_or(defaults.backoff_max_ms),
        };
        pipeline.validate()?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL")?,
            user_agents_path: env::var("USER_AGENTS_PATH").context("USER_AGENTS_PATH")?,
            session_url: env::var("SESSION_URL").unwrap_or_else(|_| DEFAULT_SESSION_URL.into()),
            search_referer: env::var("SEARCH_REFERER")
                .unwrap_or_else(|_| DEFAULT_SEARCH_REFERER.into()),
            fetch_timeout: Duration::from_secs(optional("FETCH_TIMEOUT_SECS")?.unwrap_or(30)),
            max_connections: optional("MAX_CONNECTIONS")?.unwrap_or(5),
            url_limit: optional("URL_LIMIT")?,
            pipeline,
        })
    }
}

fn optional<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(Some(
            v.trim().parse().with_context(|| format!("invalid {key}: {v}"))?,
        )),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.workers >= 1);
        assert_eq!(cfg.pacing, Duration::from_secs(1));
        cfg.validate().unwrap();
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let cfg = PipelineConfig {
            backoff_min_ms: 100,
            backoff_max_ms: 10,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cfg = PipelineConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
