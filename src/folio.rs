//! Folio allocation.
//!
//! Two policies are supported:
//!
//! - **Durable**: each allocation is one atomic increment on a
//!   [`FolioCounterStore`] row. Safe across restarts and instances.
//! - **In-memory**: a counter map behind a mutex inside this process.
//!   Degraded mode only: counters restart at 1 with the process and separate
//!   instances hand out the same folios. It is never used unless configured,
//!   and an unreachable durable store never falls back to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{FacturaError, Folio, validate_series};
use crate::store::FolioCounterStore;

/// Which allocation policy to run with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    #[default]
    Durable,
    InMemory,
}

/// Process-local folio counters, one per `(series, issuer_id)`.
///
/// Increment and formatting happen under a single lock, so concurrent
/// callers in the same process always receive distinct, consecutive folios.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl InMemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, series: &str, issuer_id: &str, padding: usize) -> Result<Folio, FacturaError> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters
            .entry((series.to_string(), issuer_id.to_string()))
            .or_insert(0);
        *counter = counter.checked_add(1).ok_or_else(|| {
            FacturaError::Numbering(format!("folio counter for series '{series}' overflowed"))
        })?;
        Ok(Folio::new(series, *counter).with_padding(padding))
    }
}

#[derive(Clone)]
enum Backend {
    Durable(Arc<dyn FolioCounterStore>),
    InMemory(Arc<InMemoryCounter>),
}

/// Hands out folios that are never repeated for a `(series, issuer_id)` pair.
#[derive(Clone)]
pub struct FolioAllocator {
    backend: Backend,
    padding: usize,
}

impl std::fmt::Debug for FolioAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolioAllocator")
            .field("policy", &self.policy())
            .field("padding", &self.padding)
            .finish()
    }
}

impl FolioAllocator {
    /// Allocate through a durable counter store.
    pub fn durable(store: Arc<dyn FolioCounterStore>) -> Self {
        Self {
            backend: Backend::Durable(store),
            padding: 0,
        }
    }

    /// Allocate from a process-local counter. See the module docs for why
    /// this is a degraded mode.
    pub fn in_memory() -> Self {
        Self::with_counter(Arc::new(InMemoryCounter::new()))
    }

    /// Allocate from an existing process-local counter.
    pub fn with_counter(counter: Arc<InMemoryCounter>) -> Self {
        warn!("folio allocation running in-memory: folios are not unique across restarts or instances");
        Self {
            backend: Backend::InMemory(counter),
            padding: 0,
        }
    }

    /// Set zero-padding width for the numeric part (default: 0).
    pub fn with_padding(mut self, width: usize) -> Self {
        self.padding = width;
        self
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn policy(&self) -> AllocationPolicy {
        match self.backend {
            Backend::Durable(_) => AllocationPolicy::Durable,
            Backend::InMemory(_) => AllocationPolicy::InMemory,
        }
    }

    /// True when running the in-memory policy. Callers should surface this.
    pub fn is_degraded(&self) -> bool {
        self.policy() == AllocationPolicy::InMemory
    }

    /// Allocate the next folio for `(series, issuer_id)`.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` if the durable counter cannot be reached,
    /// `Numbering` if the series is malformed.
    pub async fn allocate(&self, series: &str, issuer_id: &str) -> Result<Folio, FacturaError> {
        validate_series(series)?;
        let folio = match &self.backend {
            Backend::Durable(store) => {
                let number = store
                    .next_value(series, issuer_id)
                    .await
                    .map_err(|e| e.during(format!("allocating folio {series}/{issuer_id}")))?;
                Folio::new(series, number).with_padding(self.padding)
            }
            Backend::InMemory(counter) => counter.next(series, issuer_id, self.padding)?,
        };
        debug!(folio = %folio, issuer_id, policy = ?self.policy(), "folio allocated");
        Ok(folio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFolioCounterStore;

    #[tokio::test]
    async fn durable_allocation_is_sequential() {
        let alloc = FolioAllocator::durable(Arc::new(MemoryFolioCounterStore::new()));
        assert_eq!(alloc.allocate("A", "AAA010101AAA").await.unwrap().to_string(), "A1");
        assert_eq!(alloc.allocate("A", "AAA010101AAA").await.unwrap().to_string(), "A2");
        assert!(!alloc.is_degraded());
    }

    #[tokio::test]
    async fn in_memory_allocation_is_padded() {
        let alloc = FolioAllocator::in_memory().with_padding(4);
        assert_eq!(alloc.allocate("B", "X").await.unwrap().to_string(), "B0001");
        assert_eq!(alloc.allocate("B", "X").await.unwrap().to_string(), "B0002");
        assert_eq!(alloc.allocate("", "X").await.unwrap().to_string(), "0001");
        assert!(alloc.is_degraded());
    }

    #[tokio::test]
    async fn independent_counters_do_not_share_state() {
        let a = FolioAllocator::in_memory();
        let b = FolioAllocator::in_memory();
        assert_eq!(a.allocate("A", "X").await.unwrap().number, 1);
        assert_eq!(a.allocate("A", "X").await.unwrap().number, 2);
        assert_eq!(b.allocate("A", "X").await.unwrap().number, 1);
    }

    #[tokio::test]
    async fn malformed_series_is_rejected() {
        let alloc = FolioAllocator::in_memory();
        assert!(matches!(
            alloc.allocate("A-", "X").await,
            Err(FacturaError::Numbering(_))
        ));
    }
}
