//! End-to-end invoice generation.
//!
//! ```text
//! request -> resolve fiscal data -> obtain folio -> assemble -> render XML/PDF
//!         -> stamp (optional, re-render on success) -> package -> response
//!                                                              \-> history (background)
//! ```
//!
//! Once a folio is obtained it is consumed: any later failure is reported
//! through [`GenerationError`] together with that folio.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::archive::{archive_name, invoice_metadata, package};
use crate::assemble::{Assembler, InvoiceDefaults, obtain_folio};
use crate::core::*;
use crate::fiscal::FiscalResolver;
use crate::folio::{AllocationPolicy, FolioAllocator, InMemoryCounter};
use crate::history::HistoryRecorder;
use crate::pdf::render_pdf;
use crate::stamping::{PacCredentials, StampingAuthority, StampingConfig, StampingCoordinator};
use crate::store::{
    FiscalDataStore, FolioCounterStore, HistoryRecord, HistoryStore, LogoSource, RecordId,
};
use crate::xml::to_cfdi_xml;

/// Generator settings.
///
/// ```
/// use factura::service::GeneratorConfig;
///
/// let config: GeneratorConfig = serde_json::from_str(r#"{
///     "default_series": "A",
///     "folio_padding": 6,
///     "fallback_user_id": "admin",
///     "stamping": { "timeout_secs": 20 }
/// }"#).unwrap();
/// assert_eq!(config.defaults.currency, "MXN");
/// assert!(config.stamping.unwrap().enabled);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Series used when the request names none.
    pub default_series: Option<String>,
    /// Zero-padding width of the numeric folio part.
    pub folio_padding: usize,
    /// Account whose fiscal data is borrowed by users without their own.
    pub fallback_user_id: Option<String>,
    pub allocation: AllocationPolicy,
    /// `None` produces unstamped documents.
    pub stamping: Option<StampingConfig>,
    pub defaults: InvoiceDefaults,
}

/// Rendered artifacts of one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Documents {
    pub name: String,
    pub xml: String,
    pub pdf: Vec<u8>,
    pub archive: Vec<u8>,
}

/// Successful generation result.
///
/// A failed stamp is still a success: check `invoice.status` and
/// `invoice.error_log`.
#[derive(Debug)]
pub struct GeneratedInvoice {
    pub invoice: Invoice,
    pub documents: Documents,
    /// Issuer identity came from the fallback account.
    pub borrowed_identity: bool,
    /// Background history insert. Dropping it does not cancel the insert.
    pub history: JoinHandle<Option<RecordId>>,
}

/// A generation failure, with the folio if one was already consumed.
#[derive(Debug)]
pub struct GenerationError {
    pub folio: Option<Folio>,
    pub source: FacturaError,
}

impl GenerationError {
    fn before_folio(source: FacturaError) -> Self {
        Self {
            folio: None,
            source,
        }
    }
}

fn consumed(folio: &Folio) -> impl Fn(FacturaError) -> GenerationError + '_ {
    move |source| GenerationError {
        folio: Some(folio.clone()),
        source,
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.folio {
            Some(folio) => write!(f, "invoice generation failed after consuming folio {folio}: {}", self.source),
            None => write!(f, "invoice generation failed: {}", self.source),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Builder for [`InvoiceGenerator`].
pub struct InvoiceGeneratorBuilder {
    config: GeneratorConfig,
    fiscal: Option<Arc<dyn FiscalDataStore>>,
    history: Option<Arc<dyn HistoryStore>>,
    counter: Option<Arc<dyn FolioCounterStore>>,
    in_memory: Option<Arc<InMemoryCounter>>,
    logos: Option<Arc<dyn LogoSource>>,
    authority: Option<(Arc<dyn StampingAuthority>, PacCredentials)>,
}

impl InvoiceGeneratorBuilder {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            fiscal: None,
            history: None,
            counter: None,
            in_memory: None,
            logos: None,
            authority: None,
        }
    }

    pub fn fiscal_store(mut self, store: Arc<dyn FiscalDataStore>) -> Self {
        self.fiscal = Some(store);
        self
    }

    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Durable counter, required by [`AllocationPolicy::Durable`].
    pub fn folio_counter(mut self, store: Arc<dyn FolioCounterStore>) -> Self {
        self.counter = Some(store);
        self
    }

    /// Share an in-memory counter between generators in the same process.
    /// Only used with [`AllocationPolicy::InMemory`].
    pub fn in_memory_counter(mut self, counter: Arc<InMemoryCounter>) -> Self {
        self.in_memory = Some(counter);
        self
    }

    pub fn logo_source(mut self, logos: Arc<dyn LogoSource>) -> Self {
        self.logos = Some(logos);
        self
    }

    pub fn stamping_authority(
        mut self,
        authority: Arc<dyn StampingAuthority>,
        credentials: PacCredentials,
    ) -> Self {
        self.authority = Some((authority, credentials));
        self
    }

    pub fn build(self) -> Result<InvoiceGenerator, FacturaError> {
        let fiscal = self
            .fiscal
            .ok_or_else(|| FacturaError::Config("a fiscal data store is required".into()))?;
        let history = self
            .history
            .ok_or_else(|| FacturaError::Config("a history store is required".into()))?;

        if let Some(series) = &self.config.default_series {
            validate_series(series)?;
        }

        let allocator = match self.config.allocation {
            AllocationPolicy::Durable => {
                let counter = self.counter.ok_or_else(|| {
                    FacturaError::Config(
                        "durable folio allocation requires a counter store; \
                         select the in_memory policy explicitly to run without one"
                            .into(),
                    )
                })?;
                FolioAllocator::durable(counter)
            }
            AllocationPolicy::InMemory => {
                FolioAllocator::with_counter(self.in_memory.unwrap_or_default())
            }
        }
        .with_padding(self.config.folio_padding);

        if let Some(cfg) = self.config.stamping.as_ref().filter(|c| c.enabled) {
            if cfg.timeout_secs == 0 {
                return Err(FacturaError::Config(
                    "stamping timeout_secs must be at least 1".into(),
                ));
            }
        }

        let stamping = match (&self.config.stamping, self.authority) {
            (Some(cfg), Some((authority, credentials))) if cfg.enabled => Some(
                StampingCoordinator::new(authority, credentials)
                    .with_timeout(Duration::from_secs(cfg.timeout_secs)),
            ),
            (Some(cfg), None) if cfg.enabled => {
                return Err(FacturaError::Config(
                    "stamping is enabled but no stamping authority is configured".into(),
                ));
            }
            _ => None,
        };

        let mut resolver = FiscalResolver::new(fiscal);
        if let Some(fallback) = &self.config.fallback_user_id {
            resolver = resolver.with_fallback(fallback.clone());
        }

        Ok(InvoiceGenerator {
            assembler: Assembler::new(self.config.defaults.clone()),
            config: self.config,
            resolver,
            allocator,
            history: HistoryRecorder::new(history),
            logos: self.logos,
            stamping,
        })
    }
}

/// Runs the generation pipeline. Cheap to share behind an `Arc`; concurrent
/// calls only contend on folio allocation.
pub struct InvoiceGenerator {
    config: GeneratorConfig,
    resolver: FiscalResolver,
    allocator: FolioAllocator,
    assembler: Assembler,
    history: HistoryRecorder,
    logos: Option<Arc<dyn LogoSource>>,
    stamping: Option<StampingCoordinator>,
}

impl fmt::Debug for InvoiceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceGenerator")
            .field("config", &self.config)
            .field("allocator", &self.allocator)
            .field("stamping", &self.stamping)
            .finish_non_exhaustive()
    }
}

impl InvoiceGenerator {
    pub fn builder(config: GeneratorConfig) -> InvoiceGeneratorBuilder {
        InvoiceGeneratorBuilder::new(config)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn allocator(&self) -> &FolioAllocator {
        &self.allocator
    }

    /// Generate, render, optionally stamp and package one invoice for `user_id`.
    pub async fn generate(
        &self,
        user_id: &str,
        request: InvoiceRequest,
    ) -> Result<GeneratedInvoice, GenerationError> {
        let resolved = self
            .resolver
            .resolve(user_id)
            .await
            .map_err(GenerationError::before_folio)?;
        let issuer_id = resolved.data.rfc.clone();
        let series = request
            .series
            .clone()
            .or_else(|| self.config.default_series.clone())
            .unwrap_or_default();

        let folio = obtain_folio(
            &request,
            &series,
            &issuer_id,
            &self.allocator,
            self.history.store().as_ref(),
        )
        .await
        .map_err(GenerationError::before_folio)?;
        let taken = folio.clone();
        let fail = consumed(&taken);

        let mut invoice = self
            .assembler
            .assemble(&request, &resolved.data, folio)
            .map_err(&fail)?;

        let logo = self.load_logo(invoice.logo_ref.as_deref()).await;
        let mut xml = to_cfdi_xml(&invoice).map_err(&fail)?;
        let mut pdf = render_pdf(&invoice, logo.as_deref()).map_err(&fail)?;

        let mut recorded = None;
        if let Some(stamping) = &self.stamping {
            if stamping.stamp(&mut invoice, &xml).await == StampStatus::Stamped {
                // A certified UUID must reach history even if re-rendering fails.
                recorded = Some(self.history.record(invoice.clone(), resolved.borrowed));
                xml = to_cfdi_xml(&invoice).map_err(&fail)?;
                pdf = render_pdf(&invoice, logo.as_deref()).map_err(&fail)?;
            }
        }

        let name = archive_name(&invoice.folio);
        let metadata = invoice_metadata(&invoice, resolved.borrowed);
        let archive = package(&name, xml.as_bytes(), &pdf, Some(&metadata)).map_err(&fail)?;

        info!(
            user_id,
            folio = %invoice.folio,
            issuer = %issuer_id,
            status = invoice.status.label(),
            borrowed = resolved.borrowed,
            "invoice generated"
        );

        let history =
            recorded.unwrap_or_else(|| self.history.record(invoice.clone(), resolved.borrowed));
        Ok(GeneratedInvoice {
            invoice,
            documents: Documents {
                name,
                xml,
                pdf,
                archive,
            },
            borrowed_identity: resolved.borrowed,
            history,
        })
    }

    /// Re-render the documents of a recorded invoice.
    ///
    /// The stored invoice is never modified; XML is byte-identical to what
    /// was delivered at generation time.
    pub async fn redownload(
        &self,
        record_id: RecordId,
    ) -> Result<(HistoryRecord, Documents), FacturaError> {
        let record = self
            .history
            .store()
            .get(record_id)
            .await
            .map_err(|e| e.during(format!("loading history record {record_id}")))?
            .ok_or_else(|| FacturaError::NotFound(format!("history record {record_id}")))?;

        let invoice = &record.invoice;
        let logo = self.load_logo(invoice.logo_ref.as_deref()).await;
        let xml = to_cfdi_xml(invoice)?;
        let pdf = render_pdf(invoice, logo.as_deref())?;
        let name = archive_name(&invoice.folio);
        let metadata = invoice_metadata(invoice, record.borrowed_identity);
        let archive = package(&name, xml.as_bytes(), &pdf, Some(&metadata))?;

        Ok((
            record,
            Documents {
                name,
                xml,
                pdf,
                archive,
            },
        ))
    }

    /// A missing or unreadable logo never fails generation.
    async fn load_logo(&self, reference: Option<&str>) -> Option<Vec<u8>> {
        let (logos, reference) = (self.logos.as_ref()?, reference?);
        match logos.load_logo(reference).await {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                warn!(logo = reference, "logo not found, rendering without it");
                None
            }
            Err(e) => {
                warn!(logo = reference, error = %e, "logo source failed, rendering without it");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryFiscalStore, MemoryFolioCounterStore, MemoryHistoryStore};
    use rust_decimal_macros::dec;

    fn fiscal() -> Arc<MemoryFiscalStore> {
        Arc::new(MemoryFiscalStore::new().with(
            "u1",
            FiscalData::new("AAA010101AAA", "Empresa Ejemplo", "601", "01000"),
        ))
    }

    fn request() -> InvoiceRequest {
        InvoiceRequest::new(
            "T-1",
            dec!(116.00),
            Receiver::new("XAXX010101000", "Publico en General", "01000"),
        )
    }

    #[test]
    fn durable_policy_requires_counter() {
        let err = InvoiceGenerator::builder(GeneratorConfig::default())
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, FacturaError::Config(_)));
    }

    #[test]
    fn enabled_stamping_requires_authority() {
        let config = GeneratorConfig {
            stamping: Some(StampingConfig::default()),
            ..Default::default()
        };
        let err = InvoiceGenerator::builder(config)
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("stamping authority"));
    }

    #[test]
    fn zero_stamping_timeout_rejected() {
        let config = GeneratorConfig {
            stamping: Some(StampingConfig {
                timeout_secs: 0,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = InvoiceGenerator::builder(config)
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, FacturaError::Config(_)));
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn disabled_stamping_needs_nothing() {
        let config = GeneratorConfig {
            stamping: Some(StampingConfig {
                enabled: false,
                ..Default::default()
            }),
            allocation: AllocationPolicy::InMemory,
            ..Default::default()
        };
        let generator = InvoiceGenerator::builder(config)
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .build()
            .unwrap();
        assert!(generator.allocator().is_degraded());
    }

    #[tokio::test]
    async fn unknown_user_fails_without_folio() {
        let generator = InvoiceGenerator::builder(GeneratorConfig::default())
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
            .build()
            .unwrap();
        let err = generator.generate("nobody", request()).await.unwrap_err();
        assert!(err.folio.is_none());
        assert!(matches!(err.source, FacturaError::NoFiscalDataConfigured { .. }));
    }

    #[tokio::test]
    async fn render_failure_reports_consumed_folio() {
        let logos = crate::store::MemoryLogoSource::new().with("bad", b"GIF89a".to_vec());
        let counter = Arc::new(MemoryFolioCounterStore::new());
        let generator = InvoiceGenerator::builder(GeneratorConfig::default())
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .folio_counter(counter.clone())
            .logo_source(Arc::new(logos))
            .build()
            .unwrap();
        let err = generator
            .generate("u1", request().series("A").logo("bad"))
            .await
            .unwrap_err();
        assert_eq!(err.folio, Some(Folio::new("A", 1)));
        assert!(matches!(err.source, FacturaError::Render(_)));
        assert!(err.to_string().contains("consuming folio A1"));
        // Not rolled back.
        assert_eq!(counter.current("A", "AAA010101AAA"), Some(1));
    }

    #[tokio::test]
    async fn missing_logo_is_skipped() {
        let generator = InvoiceGenerator::builder(GeneratorConfig::default())
            .fiscal_store(fiscal())
            .history_store(Arc::new(MemoryHistoryStore::new()))
            .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
            .logo_source(Arc::new(crate::store::MemoryLogoSource::new()))
            .build()
            .unwrap();
        let generated = generator
            .generate("u1", request().logo("missing"))
            .await
            .unwrap();
        assert!(generated.documents.pdf.starts_with(b"%PDF"));
    }
}
