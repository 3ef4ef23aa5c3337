//! End-to-end generation through `InvoiceGenerator` with mock collaborators.
//!
//! Run with: `cargo test --test pipeline_tests`

#![cfg(feature = "service")]

use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use factura::core::*;
use factura::folio::AllocationPolicy;
use factura::service::{GeneratorConfig, InvoiceGenerator};
use factura::stamping::{PacCredentials, StampingAuthority, StampingConfig};
use factura::store::*;
use rust_decimal_macros::dec;

const ISSUER: &str = "AAA010101AAA";

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

/// Certification authority that always fails.
struct DownPac {
    calls: AtomicUsize,
}

#[async_trait]
impl StampingAuthority for DownPac {
    async fn submit(&self, _: &[u8], _: &PacCredentials) -> Result<Vec<u8>, FacturaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FacturaError::StampFailed("PAC returned HTTP 503: mantenimiento".into()))
    }
}

/// Certification authority that appends a TimbreFiscalDigital to what it receives.
struct SigningPac;

#[async_trait]
impl StampingAuthority for SigningPac {
    async fn submit(&self, xml: &[u8], creds: &PacCredentials) -> Result<Vec<u8>, FacturaError> {
        assert_eq!(creds.user, "demo");
        let xml = std::str::from_utf8(xml).unwrap();
        let tfd = concat!(
            "<cfdi:Complemento>",
            r#"<tfd:TimbreFiscalDigital xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital" "#,
            r#"Version="1.1" UUID="5FB2822E-396D-4725-8521-CDC4BDD20CCF" "#,
            r#"FechaTimbrado="2024-05-02T10:31:12" RfcProvCertif="SPR190613I52" "#,
            r#"SelloCFD="c2VsbG9DRkQ=" NoCertificadoSAT="30001000000500003456" SelloSAT="c2VsbG9TQVQ="/>"#,
            "</cfdi:Complemento></cfdi:Comprobante>",
        );
        Ok(xml.replace("</cfdi:Comprobante>", tfd).into_bytes())
    }
}

/// History store that reserves folios but cannot write records.
struct DownHistory;

#[async_trait]
impl HistoryStore for DownHistory {
    async fn insert(&self, _: &Invoice, _: bool) -> Result<RecordId, StoreError> {
        Err(StoreError::Unavailable("history database offline".into()))
    }
    async fn exists_folio(&self, _: &str, _: u64, _: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
    async fn reserve_folio(&self, _: &str, _: u64, _: &str) -> Result<bool, StoreError> {
        Ok(true)
    }
    async fn get(&self, _: RecordId) -> Result<Option<HistoryRecord>, StoreError> {
        Ok(None)
    }
}

/// In-memory history whose record writes fail; reservations still work.
struct WriteFailingHistory {
    inner: MemoryHistoryStore,
}

#[async_trait]
impl HistoryStore for WriteFailingHistory {
    async fn insert(&self, _: &Invoice, _: bool) -> Result<RecordId, StoreError> {
        Err(StoreError::Backend("insert rejected".into()))
    }
    async fn exists_folio(&self, series: &str, folio: u64, issuer: &str) -> Result<bool, StoreError> {
        self.inner.exists_folio(series, folio, issuer).await
    }
    async fn reserve_folio(&self, series: &str, folio: u64, issuer: &str) -> Result<bool, StoreError> {
        self.inner.reserve_folio(series, folio, issuer).await
    }
    async fn get(&self, id: RecordId) -> Result<Option<HistoryRecord>, StoreError> {
        self.inner.get(id).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fiscal_store() -> Arc<MemoryFiscalStore> {
    Arc::new(
        MemoryFiscalStore::new()
            .with("owner", FiscalData::new(ISSUER, "Empresa Ejemplo", "601", "01000"))
            .with(
                "admin",
                FiscalData::new("ADM010101AB1", "Administradora SA", "601", "06600"),
            ),
    )
}

fn config() -> GeneratorConfig {
    GeneratorConfig {
        default_series: Some("A".into()),
        ..Default::default()
    }
}

fn request() -> InvoiceRequest {
    InvoiceRequest::new(
        "T-100",
        dec!(116.00),
        Receiver::new("XAXX010101000", "Público en General", "01000"),
    )
    .issued_at(
        NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap(),
    )
}

struct Setup {
    generator: InvoiceGenerator,
    history: Arc<MemoryHistoryStore>,
    counter: Arc<MemoryFolioCounterStore>,
}

fn setup(config: GeneratorConfig, pac: Option<Arc<dyn StampingAuthority>>) -> Setup {
    let history = Arc::new(MemoryHistoryStore::new());
    let counter = Arc::new(MemoryFolioCounterStore::new());
    let mut builder = InvoiceGenerator::builder(config)
        .fiscal_store(fiscal_store())
        .history_store(history.clone())
        .folio_counter(counter.clone());
    if let Some(pac) = pac {
        builder = builder.stamping_authority(pac, PacCredentials::new("demo", "secret"));
    }
    Setup {
        generator: builder.build().unwrap(),
        history,
        counter,
    }
}

fn stamping_config() -> GeneratorConfig {
    GeneratorConfig {
        stamping: Some(StampingConfig::default()),
        ..config()
    }
}

fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn zip_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut content = Vec::new();
    file.read_to_end(&mut content).unwrap();
    content
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_first_invoice() {
    let s = setup(config(), None);
    let generated = s.generator.generate("owner", request()).await.unwrap();

    let inv = &generated.invoice;
    assert_eq!(inv.folio.to_string(), "A1");
    assert_eq!(inv.totals.subtotal, dec!(100.00));
    assert_eq!(inv.totals.tax, dec!(16.00));
    assert_eq!(inv.concepts.len(), 1);
    assert_eq!(inv.concepts[0].amount, dec!(100.00));
    assert_eq!(inv.status, StampStatus::Unstamped);
    assert!(!generated.borrowed_identity);

    let xml = &generated.documents.xml;
    assert!(xml.contains(r#"Serie="A""#));
    assert!(xml.contains(r#"Folio="1""#));
    assert!(xml.contains(r#"SubTotal="100.00""#));
    assert!(xml.contains(r#"TotalImpuestosTrasladados="16.00""#));
    assert!(xml.contains(r#"Rfc="AAA010101AAA""#));
    assert!(!xml.contains("TimbreFiscalDigital"));

    assert!(generated.documents.pdf.starts_with(b"%PDF"));
    assert_eq!(generated.documents.name, "A1");
    assert_eq!(zip_names(&generated.documents.archive), ["A1.xml", "A1.pdf", "A1.json"]);
    assert_eq!(
        zip_entry(&generated.documents.archive, "A1.xml"),
        generated.documents.xml.as_bytes()
    );

    let record_id = generated.history.await.unwrap().unwrap();
    let record = s.history.get(record_id).await.unwrap().unwrap();
    assert_eq!(record.invoice, generated.invoice);
    assert!(!record.borrowed_identity);
}

#[tokio::test]
async fn sequential_invoices_get_sequential_folios() {
    let s = setup(config(), None);
    for expected in ["A1", "A2", "A3"] {
        let generated = s.generator.generate("owner", request()).await.unwrap();
        assert_eq!(generated.invoice.folio.to_string(), expected);
    }
    assert_eq!(s.counter.current("A", ISSUER), Some(3));
}

#[tokio::test]
async fn request_series_overrides_default() {
    let s = setup(config(), None);
    let generated = s
        .generator
        .generate("owner", request().series("MOSTRADOR"))
        .await
        .unwrap();
    assert_eq!(generated.invoice.folio.to_string(), "MOSTRADOR1");
}

#[tokio::test]
async fn padding_applies_to_folio_and_archive_name() {
    let s = setup(
        GeneratorConfig {
            folio_padding: 6,
            ..config()
        },
        None,
    );
    let generated = s.generator.generate("owner", request()).await.unwrap();
    assert_eq!(generated.invoice.folio.to_string(), "A000001");
    assert!(generated.documents.xml.contains(r#"Folio="000001""#));
    assert_eq!(zip_names(&generated.documents.archive)[0], "A000001.xml");
}

#[tokio::test]
async fn stamp_failure_still_delivers_documents() {
    let pac = Arc::new(DownPac {
        calls: AtomicUsize::new(0),
    });
    let s = setup(stamping_config(), Some(pac.clone()));

    let generated = s.generator.generate("owner", request()).await.unwrap();
    assert_eq!(pac.calls.load(Ordering::SeqCst), 1);

    let inv = &generated.invoice;
    assert_eq!(inv.status, StampStatus::StampFailed);
    assert!(inv.stamp.is_none());
    assert!(inv.error_log.as_deref().unwrap().contains("503"));
    assert_eq!(inv.folio.to_string(), "A1");

    assert!(generated.documents.xml.contains("cfdi:Comprobante"));
    assert!(lopdf::Document::load_mem(&generated.documents.pdf).is_ok());
    let meta: serde_json::Value =
        serde_json::from_slice(&zip_entry(&generated.documents.archive, "A1.json")).unwrap();
    assert_eq!(meta["status"], "stamp_failed");
    assert!(meta["uuid"].is_null());

    // Folio consumed and the failed invoice recorded.
    assert_eq!(s.counter.current("A", ISSUER), Some(1));
    generated.history.await.unwrap().unwrap();
    let records = s.history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].invoice.status, StampStatus::StampFailed);

    let next = s.generator.generate("owner", request()).await.unwrap();
    assert_eq!(next.invoice.folio.to_string(), "A2");
}

#[tokio::test]
async fn successful_stamp_is_embedded() {
    let s = setup(stamping_config(), Some(Arc::new(SigningPac)));
    let generated = s.generator.generate("owner", request()).await.unwrap();

    let inv = &generated.invoice;
    assert_eq!(inv.status, StampStatus::Stamped);
    assert!(inv.error_log.is_none());
    let stamp = inv.stamp.as_ref().unwrap();
    assert_eq!(stamp.uuid, "5FB2822E-396D-4725-8521-CDC4BDD20CCF");
    assert_eq!(stamp.pac_rfc, "SPR190613I52");

    let xml = &generated.documents.xml;
    assert!(xml.contains("tfd:TimbreFiscalDigital"));
    assert!(xml.contains(r#"UUID="5FB2822E-396D-4725-8521-CDC4BDD20CCF""#));

    let parsed = factura::xml::parse_stamped(xml).unwrap();
    assert_eq!(&parsed.stamp, stamp);

    let meta: serde_json::Value =
        serde_json::from_slice(&zip_entry(&generated.documents.archive, "A1.json")).unwrap();
    assert_eq!(meta["uuid"], "5FB2822E-396D-4725-8521-CDC4BDD20CCF");
}

#[tokio::test]
async fn no_stamping_configured_leaves_invoice_unstamped() {
    let s = setup(config(), Some(Arc::new(SigningPac)));
    let generated = s.generator.generate("owner", request()).await.unwrap();
    assert_eq!(generated.invoice.status, StampStatus::Unstamped);
}

#[tokio::test]
async fn duplicate_explicit_folio_is_rejected() {
    let s = setup(config(), None);
    let first = s
        .generator
        .generate("owner", request().folio(10))
        .await
        .unwrap();
    assert_eq!(first.invoice.folio.to_string(), "A10");
    first.history.await.unwrap().unwrap();

    let err = s
        .generator
        .generate("owner", request().folio(10))
        .await
        .unwrap_err();
    assert!(err.folio.is_none());
    assert!(matches!(
        err.source,
        FacturaError::DuplicateFolio { folio: 10, .. }
    ));
    // Explicit folios never advance the counter.
    assert_eq!(s.counter.current("A", ISSUER), None);
}

#[tokio::test]
async fn allocation_skips_explicitly_issued_folios() {
    let s = setup(config(), None);
    for n in [1, 2] {
        let explicit = s.generator.generate("owner", request().folio(n)).await.unwrap();
        explicit.history.await.unwrap().unwrap();
    }

    let allocated = s.generator.generate("owner", request()).await.unwrap();
    allocated.history.await.unwrap().unwrap();
    assert_eq!(allocated.invoice.folio.to_string(), "A3");
    // Skipped numbers stay consumed.
    assert_eq!(s.counter.current("A", ISSUER), Some(3));

    let folios: Vec<String> = s
        .history
        .records()
        .iter()
        .map(|r| r.invoice.folio.to_string())
        .collect();
    assert_eq!(folios, ["A1", "A2", "A3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_for_same_explicit_folio() {
    let s = setup(config(), None);
    let generator = Arc::new(s.generator);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                match generator.generate("owner", request().folio(7)).await {
                    Ok(generated) => {
                        generated.history.await.unwrap();
                        true
                    }
                    Err(e) => {
                        assert!(matches!(e.source, FacturaError::DuplicateFolio { folio: 7, .. }));
                        false
                    }
                }
            })
        })
        .collect();

    let mut won = 0;
    for h in handles {
        if h.await.unwrap() {
            won += 1;
        }
    }
    assert_eq!(won, 1);
    assert_eq!(s.history.len(), 1);
}

#[tokio::test]
async fn explicit_folio_stays_taken_when_history_write_fails() {
    let generator = InvoiceGenerator::builder(config())
        .fiscal_store(fiscal_store())
        .history_store(Arc::new(WriteFailingHistory {
            inner: MemoryHistoryStore::new(),
        }))
        .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
        .build()
        .unwrap();

    let first = generator.generate("owner", request().folio(3)).await.unwrap();
    assert_eq!(first.history.await.unwrap(), None);

    let err = generator
        .generate("owner", request().folio(3))
        .await
        .unwrap_err();
    assert!(matches!(err.source, FacturaError::DuplicateFolio { folio: 3, .. }));
}

#[tokio::test]
async fn stamped_invoice_is_recorded_once() {
    let s = setup(stamping_config(), Some(Arc::new(SigningPac)));
    let generated = s.generator.generate("owner", request()).await.unwrap();
    let id = generated.history.await.unwrap().unwrap();

    assert_eq!(s.history.len(), 1);
    let record = s.history.get(id).await.unwrap().unwrap();
    assert_eq!(record.invoice.status, StampStatus::Stamped);
    assert_eq!(
        record.invoice.stamp.as_ref().map(|st| st.uuid.as_str()),
        Some("5FB2822E-396D-4725-8521-CDC4BDD20CCF")
    );
    assert_eq!(record.invoice, generated.invoice);
}

#[tokio::test]
async fn fallback_identity_is_borrowed_and_audited() {
    let s = setup(
        GeneratorConfig {
            fallback_user_id: Some("admin".into()),
            ..config()
        },
        None,
    );
    let generated = s.generator.generate("newcomer", request()).await.unwrap();
    assert!(generated.borrowed_identity);
    assert_eq!(generated.invoice.issuer.rfc, "ADM010101AB1");
    assert_eq!(generated.invoice.folio.to_string(), "A1");

    let meta: serde_json::Value =
        serde_json::from_slice(&zip_entry(&generated.documents.archive, "A1.json")).unwrap();
    assert_eq!(meta["borrowed_identity"], true);

    let id = generated.history.await.unwrap().unwrap();
    assert!(s.history.get(id).await.unwrap().unwrap().borrowed_identity);
}

#[tokio::test]
async fn no_fiscal_data_anywhere() {
    let s = setup(config(), None);
    let err = s.generator.generate("newcomer", request()).await.unwrap_err();
    assert!(matches!(err.source, FacturaError::NoFiscalDataConfigured { .. }));
    assert!(err.folio.is_none());
    assert_eq!(s.counter.current("A", ISSUER), None);
}

#[tokio::test]
async fn history_failure_is_not_a_request_failure() {
    let generator = InvoiceGenerator::builder(config())
        .fiscal_store(fiscal_store())
        .history_store(Arc::new(DownHistory))
        .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
        .build()
        .unwrap();
    let generated = generator.generate("owner", request()).await.unwrap();
    assert_eq!(generated.invoice.folio.to_string(), "A1");
    assert_eq!(generated.history.await.unwrap(), None);
}

#[tokio::test]
async fn redownload_reproduces_documents() {
    let s = setup(stamping_config(), Some(Arc::new(SigningPac)));
    let generated = s.generator.generate("owner", request()).await.unwrap();
    let id = generated.history.await.unwrap().unwrap();

    let (record, docs) = s.generator.redownload(id).await.unwrap();
    assert_eq!(record.invoice.folio.to_string(), "A1");
    assert_eq!(docs.xml, generated.documents.xml);
    assert_eq!(docs.name, generated.documents.name);
    assert!(docs.pdf.starts_with(b"%PDF"));
    assert_eq!(zip_names(&docs.archive), ["A1.xml", "A1.pdf", "A1.json"]);
}

#[tokio::test]
async fn redownload_unknown_record() {
    let s = setup(config(), None);
    assert!(matches!(
        s.generator.redownload(99).await,
        Err(FacturaError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_never_share_a_folio() {
    let s = setup(config(), None);
    let generator = Arc::new(s.generator);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move {
                let generated = generator.generate("owner", request()).await.unwrap();
                generated.history.await.unwrap();
                generated.invoice.folio.number
            })
        })
        .collect();

    let mut numbers = BTreeSet::new();
    for h in handles {
        assert!(numbers.insert(h.await.unwrap()));
    }
    assert_eq!(numbers.into_iter().collect::<Vec<_>>(), (1..=50).collect::<Vec<u64>>());
    assert_eq!(s.history.len(), 50);
}

#[tokio::test]
async fn in_memory_policy_runs_without_counter_store() {
    let generator = InvoiceGenerator::builder(GeneratorConfig {
        allocation: AllocationPolicy::InMemory,
        ..config()
    })
    .fiscal_store(fiscal_store())
    .history_store(Arc::new(MemoryHistoryStore::new()))
    .build()
    .unwrap();
    assert!(generator.allocator().is_degraded());
    let generated = generator.generate("owner", request()).await.unwrap();
    assert_eq!(generated.invoice.folio.to_string(), "A1");
}
