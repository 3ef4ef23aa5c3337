//! Best-effort persistence of generated invoices.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::core::Invoice;
use crate::store::{HistoryStore, RecordId};

/// Records invoices in the background.
///
/// Recording never affects the generation result: failures are logged and
/// the returned handle resolves to `None`.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Spawn the insert. Must be called from within a tokio runtime.
    pub fn record(&self, invoice: Invoice, borrowed_identity: bool) -> JoinHandle<Option<RecordId>> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.insert(&invoice, borrowed_identity).await {
                Ok(id) => {
                    debug!(record_id = id, folio = %invoice.folio, "invoice recorded in history");
                    Some(id)
                }
                Err(e) => {
                    error!(
                        folio = %invoice.folio,
                        issuer = %invoice.issuer.rfc,
                        status = invoice.status.label(),
                        error = %e,
                        "failed to record invoice in history"
                    );
                    None
                }
            }
        })
    }
}

impl std::fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRecorder").finish_non_exhaustive()
    }
}
