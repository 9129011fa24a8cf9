use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ProxyError, StorageError};

#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub address: String,
    pub last_used: Option<DateTime<Utc>>,
    pub uses: i32,
    pub is_bad: bool,
}

impl Proxy {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_used: None,
            uses: 0,
            is_bad: false,
        }
    }

    /// Proxy URL as handed to the HTTP transport.
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }
}

/// The only mutation surface over the shared proxy registry.
///
/// `acquire` picks a usable proxy and stamps its use in one atomic step;
/// `blacklist` is idempotent. A blacklisted proxy is never returned again.
#[async_trait]
pub trait ProxyRotator: Send + Sync {
    async fn acquire(&self) -> Result<Proxy, ProxyError>;

    async fn blacklist(&self, address: &str) -> Result<(), StorageError>;
}
