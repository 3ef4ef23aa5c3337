//! Invoice assembly from request payload, resolved fiscal data and folio.

use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::*;
use crate::folio::FolioAllocator;
use crate::store::HistoryStore;

/// Values used when the request leaves a field unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceDefaults {
    pub currency: String,
    pub payment_method: String,
    pub payment_form: String,
    pub export_code: String,
}

impl Default for InvoiceDefaults {
    fn default() -> Self {
        Self {
            currency: "MXN".into(),
            payment_method: "PUE".into(),
            payment_form: "99".into(),
            export_code: "01".into(),
        }
    }
}

/// Allocations skipped in a row because the number was already taken by
/// an explicit folio, before giving up.
pub const MAX_FOLIO_SKIPS: usize = 1000;

/// Obtain the folio for a request and reserve it in history.
///
/// An explicit folio is reserved as-is and rejected with `DuplicateFolio`
/// if already issued or reserved. Otherwise one is allocated; numbers
/// previously taken by explicit folios are skipped and stay consumed.
/// The returned folio is consumed even if later stages fail.
pub async fn obtain_folio(
    request: &InvoiceRequest,
    series: &str,
    issuer_id: &str,
    allocator: &FolioAllocator,
    history: &dyn HistoryStore,
) -> Result<Folio, FacturaError> {
    let Some(number) = request.folio else {
        return allocate_unreserved(series, issuer_id, allocator, history).await;
    };

    validate_series(series)?;
    if number == 0 {
        return Err(FacturaError::Numbering("folio must be numbered from 1".into()));
    }
    if !reserve(history, series, number, issuer_id).await? {
        return Err(FacturaError::DuplicateFolio {
            series: series.to_string(),
            folio: number,
        });
    }
    Ok(Folio::new(series, number).with_padding(allocator.padding()))
}

async fn allocate_unreserved(
    series: &str,
    issuer_id: &str,
    allocator: &FolioAllocator,
    history: &dyn HistoryStore,
) -> Result<Folio, FacturaError> {
    for _ in 0..=MAX_FOLIO_SKIPS {
        let folio = allocator.allocate(series, issuer_id).await?;
        if reserve(history, series, folio.number, issuer_id).await? {
            return Ok(folio);
        }
        warn!(folio = %folio, issuer_id, "allocated folio already issued explicitly, skipping");
    }
    Err(FacturaError::Numbering(format!(
        "no free folio in series '{series}' after skipping {MAX_FOLIO_SKIPS} issued numbers"
    )))
}

async fn reserve(
    history: &dyn HistoryStore,
    series: &str,
    number: u64,
    issuer_id: &str,
) -> Result<bool, FacturaError> {
    history
        .reserve_folio(series, number, issuer_id)
        .await
        .map_err(|e| e.during(format!("reserving folio {series}{number}")))
}

/// Builds canonical invoices. Pure: no I/O, no shared state.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    defaults: InvoiceDefaults,
}

impl Assembler {
    pub fn new(defaults: InvoiceDefaults) -> Self {
        Self { defaults }
    }

    /// Assemble an invoice.
    ///
    /// - Issuer fields always come from `fiscal`; a request-supplied issuer is ignored.
    /// - Totals are derived from the tax-inclusive request total at 16% IVA.
    /// - Without explicit concepts, a single concept for the ticket is synthesized
    ///   with quantity 1 and amount equal to the subtotal. Explicit concepts are
    ///   carried through unmodified.
    pub fn assemble(
        &self,
        request: &InvoiceRequest,
        fiscal: &FiscalData,
        folio: Folio,
    ) -> Result<Invoice, FacturaError> {
        if request.total < Decimal::ZERO {
            return Err(FacturaError::Validation(format!(
                "total {} must not be negative",
                request.total
            )));
        }
        if request.issuer.as_ref().is_some_and(|i| i.rfc != fiscal.rfc) {
            debug!(folio = %folio, "ignoring issuer supplied in request");
        }

        let totals = split_tax_inclusive(request.total);
        let concepts = if request.concepts.is_empty() {
            vec![ticket_concept(&request.ticket_reference, totals.subtotal)]
        } else {
            request.concepts.clone()
        };

        let invoice = Invoice {
            folio,
            issued_at: request
                .issued_at
                .unwrap_or_else(|| Local::now().naive_local()),
            issuer: fiscal.to_issuer(),
            issuer_certificate: fiscal.certificate_number.clone(),
            receiver: request.receiver.clone(),
            currency: request
                .currency
                .clone()
                .unwrap_or_else(|| self.defaults.currency.clone()),
            payment_method: request
                .payment_method
                .clone()
                .unwrap_or_else(|| self.defaults.payment_method.clone()),
            payment_form: request
                .payment_form
                .clone()
                .unwrap_or_else(|| self.defaults.payment_form.clone()),
            export_code: self.defaults.export_code.clone(),
            ticket_reference: request.ticket_reference.clone(),
            concepts,
            totals,
            status: StampStatus::Unstamped,
            stamp: None,
            error_log: None,
            logo_ref: request.logo_ref.clone(),
        };

        let errors = validate_invoice(&invoice);
        if !errors.is_empty() {
            return Err(validation_failure(&errors));
        }
        Ok(invoice)
    }
}

fn ticket_concept(ticket_reference: &str, subtotal: Decimal) -> Concept {
    Concept::new(format!("Ticket {ticket_reference}"), Decimal::ONE, subtotal)
}
