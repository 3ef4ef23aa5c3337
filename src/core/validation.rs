use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::ValidationError;
use super::types::*;

/// Generic RFC for domestic receivers without an RFC (público en general).
pub const GENERIC_RFC: &str = "XAXX010101000";
/// Generic RFC for foreign receivers.
pub const FOREIGN_RFC: &str = "XEXX010101000";

/// Validate an RFC by format (no lookup against the SAT registry).
///
/// Legal entities have 12 characters (3 letters), individuals 13
/// (4 letters), followed by a YYMMDD date and a 3-character homoclave.
pub fn validate_rfc(rfc: &str) -> Result<(), String> {
    let rfc = rfc.trim();
    if rfc == GENERIC_RFC || rfc == FOREIGN_RFC {
        return Ok(());
    }

    let chars: Vec<char> = rfc.chars().collect();
    let letters = match chars.len() {
        12 => 3,
        13 => 4,
        n => return Err(format!("must be 12 or 13 characters, got {n}")),
    };

    let name_part = &chars[..letters];
    if !name_part
        .iter()
        .all(|c| c.is_ascii_uppercase() || *c == 'Ñ' || *c == '&')
    {
        return Err("name part must be uppercase letters".into());
    }

    let date_part: String = chars[letters..letters + 6].iter().collect();
    if !date_part.chars().all(|c| c.is_ascii_digit()) {
        return Err("date part must be 6 digits (YYMMDD)".into());
    }
    let yy: i32 = date_part[0..2].parse().map_err(|_| "invalid year")?;
    let mm: u32 = date_part[2..4].parse().map_err(|_| "invalid month")?;
    let dd: u32 = date_part[4..6].parse().map_err(|_| "invalid day")?;
    // Century is irrelevant for day validity except Feb 29; 2000 is a leap year.
    if NaiveDate::from_ymd_opt(2000 + yy, mm, dd).is_none() {
        return Err(format!("'{date_part}' is not a valid date"));
    }

    let homoclave = &chars[letters + 6..];
    if !homoclave
        .iter()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("homoclave must be uppercase letters or digits".into());
    }

    Ok(())
}

/// Validate an assembled invoice. Returns all errors found (not just the first).
pub fn validate_invoice(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(msg) = validate_rfc(&invoice.issuer.rfc) {
        errors.push(ValidationError::with_rule("issuer.rfc", msg, "CFDI40131"));
    }
    if invoice.issuer.legal_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "issuer.legal_name",
            "legal name must not be empty",
        ));
    }
    validate_postal_code(&invoice.issuer.postal_code, "issuer.postal_code", &mut errors);

    if let Err(msg) = validate_rfc(&invoice.receiver.rfc) {
        errors.push(ValidationError::with_rule("receiver.rfc", msg, "CFDI40141"));
    }
    if invoice.receiver.legal_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "receiver.legal_name",
            "legal name must not be empty",
        ));
    }
    validate_postal_code(
        &invoice.receiver.postal_code,
        "receiver.postal_code",
        &mut errors,
    );

    if invoice.currency.len() != 3 || !invoice.currency.chars().all(|c| c.is_ascii_uppercase()) {
        errors.push(ValidationError::new(
            "currency",
            format!("currency '{}' must be a 3-letter ISO 4217 code", invoice.currency),
        ));
    }

    if invoice.concepts.is_empty() {
        errors.push(ValidationError::new(
            "concepts",
            "invoice must have at least one concept",
        ));
    }
    for (i, concept) in invoice.concepts.iter().enumerate() {
        validate_concept(concept, i, &mut errors);
    }

    let t = &invoice.totals;
    if t.total < Decimal::ZERO {
        errors.push(ValidationError::new("totals.total", "total must not be negative"));
    }
    if t.subtotal + t.tax != t.total {
        errors.push(ValidationError::with_rule(
            "totals",
            format!(
                "subtotal {} + tax {} does not equal total {}",
                t.subtotal, t.tax, t.total
            ),
            "CFDI40108",
        ));
    }

    errors
}

fn validate_postal_code(code: &str, field: &str, errors: &mut Vec<ValidationError>) {
    if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ValidationError::new(
            field,
            format!("postal code '{code}' must be 5 digits"),
        ));
    }
}

fn validate_concept(concept: &Concept, idx: usize, errors: &mut Vec<ValidationError>) {
    let prefix = format!("concepts[{idx}]");
    if concept.description.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{prefix}.description"),
            "description must not be empty",
        ));
    }
    if concept.quantity <= Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.quantity"),
            "quantity must be positive",
        ));
    }
    if concept.unit_value < Decimal::ZERO || concept.amount < Decimal::ZERO {
        errors.push(ValidationError::new(
            format!("{prefix}.amount"),
            "amounts must not be negative",
        ));
    }
    if let Some(discount) = concept.discount {
        if discount < Decimal::ZERO || discount > concept.amount {
            errors.push(ValidationError::new(
                format!("{prefix}.discount"),
                "discount must be between zero and the concept amount",
            ));
        }
    }
}
