//! Generate one invoice end to end with in-memory stores and write the
//! resulting archive to the system temp directory.
//!
//! Run with: `RUST_LOG=factura=debug cargo run --example generate_invoice`

use std::sync::Arc;

use factura::core::*;
use factura::service::{GeneratorConfig, InvoiceGenerator};
use factura::store::{MemoryFiscalStore, MemoryFolioCounterStore, MemoryHistoryStore};
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("factura=info")),
        )
        .init();

    let fiscal = MemoryFiscalStore::new()
        .with(
            "admin",
            FiscalData::new("EKU9003173C9", "ESCUELA KEMPER URGATE", "601", "42501")
                .address("Av. Reforma 100, Ciudad de México")
                .certificate_number("30001000000500003416"),
        )
        .with(
            "tienda-centro",
            FiscalData::new("AAA010101AAA", "Tienda Centro SA de CV", "601", "06000"),
        );

    let config = GeneratorConfig {
        default_series: Some("A".into()),
        folio_padding: 4,
        fallback_user_id: Some("admin".into()),
        ..GeneratorConfig::default()
    };

    let generator = InvoiceGenerator::builder(config)
        .fiscal_store(Arc::new(fiscal))
        .history_store(Arc::new(MemoryHistoryStore::new()))
        .folio_counter(Arc::new(MemoryFolioCounterStore::new()))
        .build()?;

    let request = InvoiceRequest::new(
        "TICKET-2024-0042",
        dec!(348),
        Receiver::new("XAXX010101000", "Público en General", "42501"),
    )
    .add_concept(Concept::new("Consultoría (hora)", dec!(2), dec!(100)))
    .add_concept(Concept::new("Material didáctico", dec!(1), dec!(100)));

    for user in ["tienda-centro", "sucursal-sin-datos"] {
        let generated = generator.generate(user, request.clone()).await?;
        let invoice = &generated.invoice;

        println!("Folio:      {}", invoice.folio);
        println!("Emisor:     {} ({})", invoice.issuer.legal_name, invoice.issuer.rfc);
        println!("Prestado:   {}", generated.borrowed_identity);
        println!("Subtotal:   {}", format_amount(invoice.totals.subtotal));
        println!("IVA 16%:    {}", format_amount(invoice.totals.tax));
        println!("Total:      {}", format_amount(invoice.totals.total));
        println!("Estado:     {}", invoice.status.label());

        let path = std::env::temp_dir().join(format!("{}.zip", generated.documents.name));
        std::fs::write(&path, &generated.documents.archive)?;
        println!("Archivo:    {}", path.display());

        if let Ok(Some(id)) = generated.history.await {
            println!("Historial:  #{id}");
        }
        println!();
    }

    Ok(())
}
