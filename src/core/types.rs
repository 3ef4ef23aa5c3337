use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::numbering::Folio;

/// Default SAT product/service key ("No existe en el catálogo").
pub const DEFAULT_PRODUCT_CODE: &str = "01010101";
/// Default SAT unit key ("Actividad").
pub const DEFAULT_UNIT_CODE: &str = "ACT";
/// ObjetoImp 02: subject to tax.
pub const DEFAULT_TAX_OBJECT: &str = "02";

/// A CFDI invoice (comprobante de ingreso) as assembled for one request.
///
/// Never mutated after it has been handed to history; corrections create
/// a new invoice with a new folio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Series + number, unique per issuer once allocated.
    pub folio: Folio,
    /// Emission date and time (`Fecha`).
    pub issued_at: NaiveDateTime,
    /// Issuer identity, always taken from stored fiscal data.
    pub issuer: Issuer,
    /// Issuer CSD certificate serial number (`NoCertificado`).
    pub issuer_certificate: Option<String>,
    pub receiver: Receiver,
    /// ISO 4217 currency (`Moneda`), usually "MXN".
    pub currency: String,
    /// `MetodoPago`: "PUE" (single payment) or "PPD" (installments).
    pub payment_method: String,
    /// `FormaPago` SAT catalog code, e.g. "01" cash, "99" to be defined.
    pub payment_form: String,
    /// `Exportacion` code, "01" for domestic.
    pub export_code: String,
    /// Point-of-sale ticket the invoice was requested for.
    pub ticket_reference: String,
    pub concepts: Vec<Concept>,
    pub totals: Totals,
    pub status: StampStatus,
    /// Present only after successful certification.
    pub stamp: Option<DigitalStamp>,
    /// Human-readable cause of the last stamping failure.
    pub error_log: Option<String>,
    /// Logo reference used for the PDF header, kept for re-downloads.
    pub logo_ref: Option<String>,
}

impl Invoice {
    /// Key under which folios are allocated for this invoice's issuer.
    pub fn issuer_id(&self) -> &str {
        &self.issuer.rfc
    }

    pub fn is_stamped(&self) -> bool {
        self.status == StampStatus::Stamped && self.stamp.is_some()
    }
}

/// Issuer (emisor) identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub rfc: String,
    pub legal_name: String,
    /// SAT tax regime code (`RegimenFiscal`), e.g. "601".
    pub tax_regime: String,
    /// Expedition postal code (`LugarExpedicion`).
    pub postal_code: String,
    /// Free-form fiscal address, printed on the PDF only.
    pub address: Option<String>,
}

/// Receiver (receptor) identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub rfc: String,
    pub legal_name: String,
    /// `UsoCFDI` code, e.g. "G03" (general expenses).
    pub cfdi_use: String,
    /// `RegimenFiscalReceptor`, e.g. "616" (no fiscal obligations).
    pub tax_regime: String,
    /// `DomicilioFiscalReceptor` postal code.
    pub postal_code: String,
}

impl Receiver {
    /// Receiver with general-expense usage and the "no obligations" regime.
    pub fn new(
        rfc: impl Into<String>,
        legal_name: impl Into<String>,
        postal_code: impl Into<String>,
    ) -> Self {
        Self {
            rfc: rfc.into(),
            legal_name: legal_name.into(),
            cfdi_use: "G03".into(),
            tax_regime: "616".into(),
            postal_code: postal_code.into(),
        }
    }

    pub fn cfdi_use(mut self, code: impl Into<String>) -> Self {
        self.cfdi_use = code.into();
        self
    }

    pub fn tax_regime(mut self, code: impl Into<String>) -> Self {
        self.tax_regime = code.into();
        self
    }
}

/// Invoice line item (concepto). Owned by its invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub description: String,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub amount: Decimal,
    pub discount: Option<Decimal>,
    /// `ClaveProdServ`.
    pub product_code: String,
    /// `ClaveUnidad`.
    pub unit_code: String,
    /// `ObjetoImp`.
    pub tax_object: String,
}

impl Concept {
    /// A concept with `amount = quantity * unit_value` and default SAT keys.
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_value: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_value,
            amount: quantity * unit_value,
            discount: None,
            product_code: DEFAULT_PRODUCT_CODE.into(),
            unit_code: DEFAULT_UNIT_CODE.into(),
            tax_object: DEFAULT_TAX_OBJECT.into(),
        }
    }

    pub fn discount(mut self, discount: Decimal) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn product_code(mut self, code: impl Into<String>) -> Self {
        self.product_code = code.into();
        self
    }

    pub fn unit_code(mut self, code: impl Into<String>) -> Self {
        self.unit_code = code.into();
        self
    }
}

/// Tax-inclusive totals: `total = subtotal + tax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    /// IVA transferred at 16%.
    pub tax: Decimal,
    pub total: Decimal,
}

/// Certification state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StampStatus {
    Unstamped,
    Stamping,
    Stamped,
    StampFailed,
}

impl StampStatus {
    /// Whether no further stamping transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stamped | Self::StampFailed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unstamped => "unstamped",
            Self::Stamping => "stamping",
            Self::Stamped => "stamped",
            Self::StampFailed => "stamp_failed",
        }
    }
}

/// Timbre fiscal digital returned by the certification authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalStamp {
    /// Fiscal folio (UUID) assigned by the authority.
    pub uuid: String,
    /// `FechaTimbrado`.
    pub stamped_at: NaiveDateTime,
    /// `NoCertificadoSAT`.
    pub sat_certificate: String,
    /// `SelloCFD`, the issuer-side seal.
    pub cfd_seal: String,
    /// `SelloSAT`, the authority-side seal.
    pub sat_seal: String,
    /// `RfcProvCertif`.
    pub pac_rfc: String,
    /// TimbreFiscalDigital version, "1.1".
    pub version: String,
}

impl DigitalStamp {
    /// Cadena original del complemento de certificación digital del SAT.
    pub fn certification_chain(&self) -> String {
        format!(
            "||{}|{}|{}|{}|{}|{}||",
            self.version,
            self.uuid,
            self.stamped_at.format("%Y-%m-%dT%H:%M:%S"),
            self.pac_rfc,
            self.cfd_seal,
            self.sat_certificate
        )
    }
}

/// Issuer fiscal identity registered for a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalData {
    pub rfc: String,
    pub legal_name: String,
    pub tax_regime: String,
    pub postal_code: String,
    pub address: Option<String>,
    /// CSD certificate serial number.
    pub certificate_number: Option<String>,
}

impl FiscalData {
    pub fn new(
        rfc: impl Into<String>,
        legal_name: impl Into<String>,
        tax_regime: impl Into<String>,
        postal_code: impl Into<String>,
    ) -> Self {
        Self {
            rfc: rfc.into(),
            legal_name: legal_name.into(),
            tax_regime: tax_regime.into(),
            postal_code: postal_code.into(),
            address: None,
            certificate_number: None,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn certificate_number(mut self, number: impl Into<String>) -> Self {
        self.certificate_number = Some(number.into());
        self
    }

    /// The issuer block derived from this fiscal identity.
    pub fn to_issuer(&self) -> Issuer {
        Issuer {
            rfc: self.rfc.clone(),
            legal_name: self.legal_name.clone(),
            tax_regime: self.tax_regime.clone(),
            postal_code: self.postal_code.clone(),
            address: self.address.clone(),
        }
    }
}

/// An invoice-generation request as received from the HTTP layer.
///
/// Any `issuer` carried here is ignored: the issuer block always comes
/// from resolved fiscal data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub ticket_reference: String,
    /// Tax-inclusive ticket total.
    pub total: Decimal,
    pub receiver: Receiver,
    pub series: Option<String>,
    /// Explicit folio number; allocated when absent.
    pub folio: Option<u64>,
    pub concepts: Vec<Concept>,
    pub issued_at: Option<NaiveDateTime>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub payment_form: Option<String>,
    pub issuer: Option<Issuer>,
    pub logo_ref: Option<String>,
}

impl InvoiceRequest {
    pub fn new(ticket_reference: impl Into<String>, total: Decimal, receiver: Receiver) -> Self {
        Self {
            ticket_reference: ticket_reference.into(),
            total,
            receiver,
            series: None,
            folio: None,
            concepts: Vec::new(),
            issued_at: None,
            currency: None,
            payment_method: None,
            payment_form: None,
            issuer: None,
            logo_ref: None,
        }
    }

    pub fn series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn folio(mut self, number: u64) -> Self {
        self.folio = Some(number);
        self
    }

    pub fn add_concept(mut self, concept: Concept) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn issued_at(mut self, at: NaiveDateTime) -> Self {
        self.issued_at = Some(at);
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = Some(code.into());
        self
    }

    pub fn payment_method(mut self, code: impl Into<String>) -> Self {
        self.payment_method = Some(code.into());
        self
    }

    pub fn payment_form(mut self, code: impl Into<String>) -> Self {
        self.payment_form = Some(code.into());
        self
    }

    pub fn logo(mut self, reference: impl Into<String>) -> Self {
        self.logo_ref = Some(reference.into());
        self
    }
}
