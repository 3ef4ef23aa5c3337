//! In-memory collaborator stores.
//!
//! Each store guards its map with a `std::sync::Mutex`; no lock is held
//! across an `.await`. Suitable for tests and single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Local;

use super::{
    FiscalDataStore, FolioCounterStore, HistoryRecord, HistoryStore, LogoSource, RecordId,
    StoreError,
};
use crate::core::{FiscalData, Invoice};

// Every critical section below is a single map operation, so a poisoned
// lock still guards consistent data.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fiscal data keyed by user id.
#[derive(Debug, Default)]
pub struct MemoryFiscalStore {
    records: Mutex<HashMap<String, FiscalData>>,
}

impl MemoryFiscalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record (builder style, for setup code).
    pub fn with(self, user_id: impl Into<String>, data: FiscalData) -> Self {
        lock(&self.records).insert(user_id.into(), data);
        self
    }
}

#[async_trait]
impl FiscalDataStore for MemoryFiscalStore {
    async fn get(&self, user_id: &str) -> Result<Option<FiscalData>, StoreError> {
        Ok(lock(&self.records).get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, data: FiscalData) -> Result<(), StoreError> {
        lock(&self.records).insert(user_id.to_string(), data);
        Ok(())
    }
}

/// Folio counters keyed by `(series, issuer_id)`.
#[derive(Debug, Default)]
pub struct MemoryFolioCounterStore {
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl MemoryFolioCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a counter at `last_issued`; the next allocation returns `last_issued + 1`.
    pub fn seeded(self, series: &str, issuer_id: &str, last_issued: u64) -> Self {
        lock(&self.counters).insert((series.to_string(), issuer_id.to_string()), last_issued);
        self
    }

    /// Last issued value, if the counter exists.
    pub fn current(&self, series: &str, issuer_id: &str) -> Option<u64> {
        lock(&self.counters)
            .get(&(series.to_string(), issuer_id.to_string()))
            .copied()
    }
}

#[async_trait]
impl FolioCounterStore for MemoryFolioCounterStore {
    async fn next_value(&self, series: &str, issuer_id: &str) -> Result<u64, StoreError> {
        let mut counters = lock(&self.counters);
        let counter = counters
            .entry((series.to_string(), issuer_id.to_string()))
            .or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend(format!("folio counter for '{series}' overflowed")))?;
        Ok(*counter)
    }

    async fn exists(&self, series: &str, issuer_id: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.counters).contains_key(&(series.to_string(), issuer_id.to_string())))
    }
}

/// Invoice history with sequential record ids starting at 1.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
    /// `(series, folio, issuer_id)` claimed ahead of their records.
    reserved: Mutex<HashSet<(String, u64, String)>>,
    next_id: AtomicU64,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all records in insertion order.
    pub fn records(&self) -> Vec<HistoryRecord> {
        lock(&self.records).clone()
    }

    fn recorded(&self, series: &str, folio: u64, issuer_id: &str) -> bool {
        lock(&self.records).iter().any(|r| {
            r.invoice.folio.series == series
                && r.invoice.folio.number == folio
                && r.invoice.issuer_id() == issuer_id
        })
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(
        &self,
        invoice: &Invoice,
        borrowed_identity: bool,
    ) -> Result<RecordId, StoreError> {
        let record_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.records).push(HistoryRecord {
            record_id,
            invoice: invoice.clone(),
            borrowed_identity,
            recorded_at: Local::now().naive_local(),
        });
        Ok(record_id)
    }

    async fn exists_folio(
        &self,
        series: &str,
        folio: u64,
        issuer_id: &str,
    ) -> Result<bool, StoreError> {
        let key = (series.to_string(), folio, issuer_id.to_string());
        Ok(lock(&self.reserved).contains(&key) || self.recorded(series, folio, issuer_id))
    }

    async fn reserve_folio(
        &self,
        series: &str,
        folio: u64,
        issuer_id: &str,
    ) -> Result<bool, StoreError> {
        // Lock order: reserved, then records.
        let mut reserved = lock(&self.reserved);
        if self.recorded(series, folio, issuer_id) {
            return Ok(false);
        }
        Ok(reserved.insert((series.to_string(), folio, issuer_id.to_string())))
    }

    async fn get(&self, record_id: RecordId) -> Result<Option<HistoryRecord>, StoreError> {
        Ok(lock(&self.records)
            .iter()
            .find(|r| r.record_id == record_id)
            .cloned())
    }
}

/// Logo images keyed by reference.
#[derive(Debug, Default)]
pub struct MemoryLogoSource {
    logos: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryLogoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, reference: impl Into<String>, image: Vec<u8>) -> Self {
        lock(&self.logos).insert(reference.into(), image);
        self
    }
}

#[async_trait]
impl LogoSource for MemoryLogoSource {
    async fn load_logo(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(lock(&self.logos).get(reference).cloned())
    }
}
