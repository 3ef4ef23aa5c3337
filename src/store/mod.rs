//! Collaborator interfaces the invoice core depends on.
//!
//! The persistence engine is not part of this crate: production code plugs in
//! database-backed implementations, tests and single-process setups use the
//! in-memory ones from [`memory`].
//!
//! All methods take `&self`; implementations must be safe to share across
//! concurrently running generation requests.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{FacturaError, FiscalData, Invoice};

pub use memory::{MemoryFiscalStore, MemoryFolioCounterStore, MemoryHistoryStore, MemoryLogoSource};

/// Identifier assigned by the history store to a persisted invoice.
pub type RecordId = u64;

/// Failure reported by a collaborator store.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend could not be reached (connection refused, pool exhausted, ...).
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The backend was reached but the operation failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap into [`FacturaError::StorageUnavailable`] with operation context.
    pub fn during(self, operation: impl std::fmt::Display) -> FacturaError {
        FacturaError::StorageUnavailable(format!("{operation}: {self}"))
    }
}

/// Per-user issuer fiscal data (one active record per user).
#[async_trait]
pub trait FiscalDataStore: Send + Sync {
    /// `Ok(None)` when the user has no fiscal data.
    async fn get(&self, user_id: &str) -> Result<Option<FiscalData>, StoreError>;

    /// Replace the user's fiscal data.
    async fn put(&self, user_id: &str, data: FiscalData) -> Result<(), StoreError>;
}

/// Durable folio counter, one row per `(series, issuer_id)`.
#[async_trait]
pub trait FolioCounterStore: Send + Sync {
    /// Atomically increment and return the counter, creating it at 1 on first use.
    ///
    /// Equivalent to `UPDATE ... SET counter = counter + 1 RETURNING counter`;
    /// concurrent callers must never observe the same value.
    async fn next_value(&self, series: &str, issuer_id: &str) -> Result<u64, StoreError>;

    /// Whether a counter row exists for the pair.
    async fn exists(&self, series: &str, issuer_id: &str) -> Result<bool, StoreError>;
}

/// A persisted invoice with its audit markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub record_id: RecordId,
    pub invoice: Invoice,
    /// The issuer identity was borrowed from the fallback account.
    pub borrowed_identity: bool,
    pub recorded_at: NaiveDateTime,
}

/// Durable invoice history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert(&self, invoice: &Invoice, borrowed_identity: bool)
    -> Result<RecordId, StoreError>;

    /// Whether `(series, folio)` was already recorded or reserved for the issuer.
    async fn exists_folio(
        &self,
        series: &str,
        folio: u64,
        issuer_id: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically claim `(series, folio)` for the issuer.
    ///
    /// Insert-if-absent: returns `Ok(false)` when the folio is already
    /// recorded or reserved. A reservation outlives a failed `insert`, so a
    /// consumed folio is never handed out again.
    async fn reserve_folio(
        &self,
        series: &str,
        folio: u64,
        issuer_id: &str,
    ) -> Result<bool, StoreError>;

    async fn get(&self, record_id: RecordId) -> Result<Option<HistoryRecord>, StoreError>;
}

/// Source of logo images for the PDF header.
#[async_trait]
pub trait LogoSource: Send + Sync {
    /// `Ok(None)` when no logo exists under `reference`.
    async fn load_logo(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
