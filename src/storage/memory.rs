//! In-memory proxy registry and property store for tests and dry runs.
//!
//! Mirrors the Postgres semantics: one lock stands in for row-level
//! atomicity, and `persist` stages every table before publishing any of them.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::crawler::models::{ImprovementDetail, PropertyRecord};
use crate::error::{ProxyError, StorageError, StorageResult};
use crate::proxy::{Proxy, ProxyRotator};
use crate::storage::{is_populated, PropertyStore};

pub const TABLES: [&str; 6] = [
    "properties",
    "land",
    "improvements",
    "improvement_details",
    "roll_values",
    "jurisdictions",
];

#[derive(Debug, Default)]
struct Tables {
    properties: HashMap<i32, PropertyRecord>,
    land: Vec<i32>,
    improvements: Vec<(i64, i32)>,
    improvement_details: Vec<(i64, ImprovementDetail)>,
    roll_values: Vec<i32>,
    jurisdictions: Vec<i32>,
    next_improvement_id: i64,
}

#[derive(Default)]
pub struct MemoryStorage {
    proxies: Mutex<Vec<Proxy>>,
    tables: Mutex<Tables>,
    pending: Mutex<BTreeSet<String>>,
    fail_on: Mutex<Option<&'static str>>,
    persist_calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxies<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let storage = Self::new();
        storage
            .proxies
            .lock()
            .extend(addresses.into_iter().map(Proxy::new));
        storage
    }

    pub fn add_pending<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.lock().extend(urls.into_iter().map(Into::into));
    }

    pub fn pending_urls(&self) -> Vec<String> {
        self.pending.lock().iter().cloned().collect()
    }

    pub fn is_pending(&self, url: &str) -> bool {
        self.pending.lock().contains(url)
    }

    /// Seeds a property row directly, as an earlier run would have left it.
    pub fn insert_property(&self, property_id: i32, address: &str) {
        let record = PropertyRecord {
            property_id,
            address: address.to_string(),
            ..Default::default()
        };
        self.tables.lock().properties.insert(property_id, record);
    }

    /// Makes every later insert into `table` fail.
    pub fn fail_on(&self, table: &'static str) {
        *self.fail_on.lock() = Some(table);
    }

    pub fn proxy(&self, address: &str) -> Option<Proxy> {
        self.proxies.lock().iter().find(|p| p.address == address).cloned()
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    /// Rows stored for one property, per table.
    pub fn row_counts(&self, property_id: i32) -> HashMap<&'static str, usize> {
        let tables = self.tables.lock();
        let improvement_ids: Vec<i64> = tables
            .improvements
            .iter()
            .filter(|(_, pid)| *pid == property_id)
            .map(|(id, _)| *id)
            .collect();

        HashMap::from([
            ("properties", usize::from(tables.properties.contains_key(&property_id))),
            ("land", tables.land.iter().filter(|p| **p == property_id).count()),
            ("improvements", improvement_ids.len()),
            (
                "improvement_details",
                tables
                    .improvement_details
                    .iter()
                    .filter(|(id, _)| improvement_ids.contains(id))
                    .count(),
            ),
            ("roll_values", tables.roll_values.iter().filter(|p| **p == property_id).count()),
            ("jurisdictions", tables.jurisdictions.iter().filter(|p| **p == property_id).count()),
        ])
    }

    fn check(&self, table: &'static str) -> StorageResult<()> {
        match *self.fail_on.lock() {
            Some(t) if t == table => Err(StorageError::Rejected { table }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ProxyRotator for MemoryStorage {
    async fn acquire(&self) -> Result<Proxy, ProxyError> {
        let mut proxies = self.proxies.lock();
        let proxy = proxies
            .iter_mut()
            .filter(|p| !p.is_bad)
            .min_by_key(|p| p.last_used)
            .ok_or(ProxyError::NotFound)?;

        proxy.uses += 1;
        proxy.last_used = Some(Utc::now());
        Ok(proxy.clone())
    }

    async fn blacklist(&self, address: &str) -> Result<(), StorageError> {
        for p in self.proxies.lock().iter_mut().filter(|p| p.address == address) {
            p.is_bad = true;
        }
        Ok(())
    }
}

#[async_trait]
impl PropertyStore for MemoryStorage {
    async fn exists(&self, property_id: i32) -> StorageResult<bool> {
        Ok(self
            .tables
            .lock()
            .properties
            .get(&property_id)
            .is_some_and(|p| is_populated(&p.address)))
    }

    async fn persist(&self, record: &PropertyRecord) -> StorageResult<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);

        // Hold the lock across staging and publishing so concurrent writers
        // for the same id serialise like they would on the primary key.
        let mut tables = self.tables.lock();
        let pid = record.property_id;

        self.check("properties")?;
        if tables.properties.get(&pid).is_some_and(|p| is_populated(&p.address)) {
            return Err(StorageError::Conflict { property_id: pid });
        }

        if !record.land.is_empty() {
            self.check("land")?;
        }
        let land = vec![pid; record.land.len()];

        let mut next_id = tables.next_improvement_id;
        let mut improvements = Vec::new();
        let mut details = Vec::new();
        for improvement in &record.improvements {
            self.check("improvements")?;
            next_id += 1;
            improvements.push((next_id, pid));
            for detail in &improvement.details {
                self.check("improvement_details")?;
                details.push((next_id, detail.clone()));
            }
        }

        if !record.roll_values.is_empty() {
            self.check("roll_values")?;
        }
        let roll_values = vec![pid; record.roll_values.len()];

        if !record.jurisdictions.is_empty() {
            self.check("jurisdictions")?;
        }
        let jurisdictions = vec![pid; record.jurisdictions.len()];

        // Re-populating a shell replaces whatever children it had.
        let stale: Vec<i64> = tables
            .improvements
            .iter()
            .filter(|(_, p)| *p == pid)
            .map(|(id, _)| *id)
            .collect();
        tables.land.retain(|p| *p != pid);
        tables.improvements.retain(|(_, p)| *p != pid);
        tables.improvement_details.retain(|(id, _)| !stale.contains(id));
        tables.roll_values.retain(|p| *p != pid);
        tables.jurisdictions.retain(|p| *p != pid);

        tables.properties.insert(pid, record.clone());
        tables.land.extend(land);
        tables.improvements.extend(improvements);
        tables.improvement_details.extend(details);
        tables.roll_values.extend(roll_values);
        tables.jurisdictions.extend(jurisdictions);
        tables.next_improvement_id = next_id;

        Ok(())
    }

    async fn retire(&self, url: &str) -> StorageResult<()> {
        self.pending.lock().remove(url);
        Ok(())
    }
}
