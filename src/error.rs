//! Typed errors for every seam of the scraping pipeline.
//!
//! `anyhow` is only used at the binary edge; everything a job can fail on
//! is one of these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The property row already carries an address and must not be overwritten.
    #[error("property {property_id} is already populated")]
    Conflict { property_id: i32 },

    #[error("insert into {table} rejected")]
    Rejected { table: &'static str },
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no usable proxy available")]
    NotFound,

    #[error("proxy registry: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity pool is empty")]
    EmptyPool,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Session warm-up failed; the exit node is suspect.
    #[error("proxy {proxy} failed session warm-up: {reason}")]
    ProxyFailure { proxy: String, reason: String },

    #[error("detail fetch of {url} failed: {reason}")]
    FetchFailure { url: String, reason: String },
}

impl FetchError {
    pub fn is_proxy_failure(&self) -> bool {
        matches!(self, FetchError::ProxyFailure { .. })
    }
}

/// Why a job stopped short of retirement.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no numeric property id in {url}")]
    InvalidId { url: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ProxyAcquisition(#[from] ProxyError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
