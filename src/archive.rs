//! ZIP packaging of the rendered artifacts.
//!
//! Entries are written in a fixed order (`{name}.xml`, `{name}.pdf`, then
//! `{name}.json` when metadata is given) with a fixed 1980-01-01 timestamp
//! and fixed permissions, so the same inputs always give the same archive.

use std::io::{Cursor, Write};

use serde_json::{Value, json};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::core::*;

/// Base name used when a folio yields nothing usable.
pub const DEFAULT_ARCHIVE_NAME: &str = "factura";

fn archive_err(e: impl std::fmt::Display) -> FacturaError {
    FacturaError::Archive(e.to_string())
}

/// Bundle XML, PDF and optional JSON metadata into an in-memory ZIP.
///
/// Any write failure aborts the whole archive; a partial archive is never
/// returned.
pub fn package(
    name: &str,
    xml: &[u8],
    pdf: &[u8],
    metadata: Option<&Value>,
) -> Result<Vec<u8>, FacturaError> {
    let options = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries: Vec<(String, Vec<u8>)> = vec![
        (format!("{name}.xml"), xml.to_vec()),
        (format!("{name}.pdf"), pdf.to_vec()),
    ];
    if let Some(meta) = metadata {
        let bytes = serde_json::to_vec_pretty(meta).map_err(archive_err)?;
        entries.push((format!("{name}.json"), bytes));
    }

    for (entry, content) in entries {
        zip.start_file(entry, options).map_err(archive_err)?;
        zip.write_all(&content).map_err(archive_err)?;
    }

    let cursor = zip.finish().map_err(archive_err)?;
    Ok(cursor.into_inner())
}

/// File-system safe base name for an invoice's artifacts.
pub fn archive_name(folio: &Folio) -> String {
    let name: String = folio
        .to_string()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        DEFAULT_ARCHIVE_NAME.to_string()
    } else {
        name
    }
}

/// JSON metadata entry describing the packaged invoice.
pub fn invoice_metadata(invoice: &Invoice, borrowed_identity: bool) -> Value {
    json!({
        "folio": invoice.folio.to_string(),
        "series": invoice.folio.series,
        "number": invoice.folio.number,
        "issuer_rfc": invoice.issuer.rfc,
        "receiver_rfc": invoice.receiver.rfc,
        "issued_at": invoice.issued_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "currency": invoice.currency,
        "subtotal": format_amount(invoice.totals.subtotal),
        "tax": format_amount(invoice.totals.tax),
        "total": format_amount(invoice.totals.total),
        "status": invoice.status.label(),
        "uuid": invoice.stamp.as_ref().map(|s| s.uuid.clone()),
        "error": invoice.error_log,
        "borrowed_identity": borrowed_identity,
    })
}
