use std::fmt;

use tracing::debug;

use crate::crawler::models::PropertyRecord;
use crate::error::JobError;
use crate::proxy::Proxy;

pub const PROPERTY_ID_PARAM: &str = "prop_id";

/// Progress of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Created,
    IdParsed,
    DedupChecked,
    ProxyAcquired,
    IdentityAcquired,
    SessionWarmed,
    DetailFetched,
    Extracted,
    Persisted,
    Retired,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::IdParsed => "id_parsed",
            JobState::DedupChecked => "dedup_checked",
            JobState::ProxyAcquired => "proxy_acquired",
            JobState::IdentityAcquired => "identity_acquired",
            JobState::SessionWarmed => "session_warmed",
            JobState::DetailFetched => "detail_fetched",
            JobState::Extracted => "extracted",
            JobState::Persisted => "persisted",
            JobState::Retired => "retired",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Retired,
    Duplicate,
    /// `step` is the state the job failed to reach.
    Failed { step: JobState, error: JobError },
}

impl Outcome {
    /// Whether the pending-work entry is removed for this outcome.
    pub fn retires(&self) -> bool {
        matches!(self, Outcome::Retired | Outcome::Duplicate)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Retired => f.write_str("retired"),
            Outcome::Duplicate => f.write_str("duplicate"),
            Outcome::Failed { step, error } => write!(f, "failed before {step}: {error}"),
        }
    }
}

#[derive(Debug)]
pub struct Job {
    pub job_id: usize,
    pub worker_id: usize,
    pub url: String,
    pub raw_id: String,
    pub property_id: Option<i32>,
    pub proxy: Option<Proxy>,
    pub identity: Option<String>,
    pub body: Option<Vec<u8>>,
    pub record: Option<PropertyRecord>,
    pub state: JobState,
    pub outcome: Option<Outcome>,
}

impl Job {
    pub fn new(job_id: usize, url: impl Into<String>, raw_id: impl Into<String>) -> Self {
        Self {
            job_id,
            worker_id: 0,
            url: url.into(),
            raw_id: raw_id.into(),
            property_id: None,
            proxy: None,
            identity: None,
            body: None,
            record: None,
            state: JobState::Created,
            outcome: None,
        }
    }

    pub fn enter(&mut self, next: JobState) {
        debug_assert!(next > self.state, "{} -> {} moves backwards", self.state, next);
        debug!(
            worker = self.worker_id,
            job = self.job_id,
            property_id = %self.raw_id,
            from = %self.state,
            to = %next,
            "Job advanced"
        );
        self.state = next;
    }
}

/// Raw property id from the URL's query, empty when absent.
pub fn raw_property_id(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        return parsed
            .query_pairs()
            .find(|(k, _)| k.eq_ignore_ascii_case(PROPERTY_ID_PARAM))
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default();
    }

    url.split_once(&format!("{PROPERTY_ID_PARAM}="))
        .map(|(_, rest)| rest.split('&').next().unwrap_or_default().trim().to_string())
        .unwrap_or_default()
}

/// A usable id is a positive integer.
pub fn parse_property_id(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().filter(|id| *id > 0)
}
