pub mod fetcher;
pub mod job;
pub mod layout;
pub mod models;
pub mod parser;
pub mod service;

pub use fetcher::{HttpFetcher, PageFetcher};
pub use job::{Job, JobState, Outcome};
pub use models::PropertyRecord;
pub use service::{JobReport, RunSummary, ScrapingService};
