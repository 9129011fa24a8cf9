use async_trait::async_trait;

use crate::crawler::models::PropertyRecord;
use crate::error::StorageResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::Storage;

/// Durable side of a job: dedup lookup, atomic record write, work retirement.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// True only when the property exists and already has an address.
    async fn exists(&self, property_id: i32) -> StorageResult<bool>;

    /// Writes all five record groups in one transaction, or none of them.
    async fn persist(&self, record: &PropertyRecord) -> StorageResult<()>;

    /// Removes the URL from the pending-work list.
    async fn retire(&self, url: &str) -> StorageResult<()>;
}

/// A property row counts as populated once its address has visible text.
/// A blank or whitespace-only address marks a shell that may be re-scraped.
pub fn is_populated(address: &str) -> bool {
    !address.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_address_is_a_shell() {
        assert!(!is_populated(""));
        assert!(!is_populated("  \t "));
        assert!(is_populated("412 ELM ST"));
    }
}
