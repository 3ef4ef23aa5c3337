use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::FacturaError;

/// Maximum length of a CFDI `Serie` attribute.
pub const MAX_SERIES_LEN: usize = 25;

/// A series + sequential number pair, the human-facing invoice number.
///
/// Displays as `"{series}{number}"` with the number zero-padded to
/// `padding` digits, e.g. `"A1"` or `"A000001"`. Without a series the
/// numeric part alone is shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Folio {
    pub series: String,
    pub number: u64,
    pub padding: usize,
}

impl Folio {
    pub fn new(series: impl Into<String>, number: u64) -> Self {
        Self {
            series: series.into(),
            number,
            padding: 0,
        }
    }

    /// Set zero-padding width for the numeric part (default: 0, no padding).
    pub fn with_padding(mut self, width: usize) -> Self {
        self.padding = width;
        self
    }

    /// The numeric part as written into the CFDI `Folio` attribute.
    pub fn digits(&self) -> String {
        format!("{:0>width$}", self.number, width = self.padding)
    }
}

impl fmt::Display for Folio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_folio(&self.series, self.number, self.padding))
    }
}

/// Format a folio string: `"{series}{number}"` with zero-padding.
pub fn format_folio(series: &str, number: u64, padding: usize) -> String {
    format!("{series}{:0>width$}", number, width = padding)
}

/// Split a folio string back into `(series, number)`.
///
/// The series is everything before the trailing run of digits, so
/// `"A0042"` parses to `("A", 42)` and `"17"` to `("", 17)`.
pub fn parse_folio(folio: &str) -> Result<(String, u64), FacturaError> {
    let folio = folio.trim();
    if folio.is_empty() {
        return Err(FacturaError::Numbering("folio must not be empty".into()));
    }

    let split = folio
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| {
            FacturaError::Numbering(format!("folio '{folio}' has no numeric part"))
        })?;

    let (series, digits) = folio.split_at(split);
    let number: u64 = digits
        .parse()
        .map_err(|e| FacturaError::Numbering(format!("folio '{folio}': {e}")))?;
    if number == 0 {
        return Err(FacturaError::Numbering(format!(
            "folio '{folio}' must be numbered from 1"
        )));
    }
    validate_series(series)?;
    Ok((series.to_string(), number))
}

/// Check a series prefix: ASCII letters/digits, at most 25 characters,
/// and not ending in a digit (which would make the folio ambiguous).
pub fn validate_series(series: &str) -> Result<(), FacturaError> {
    if series.len() > MAX_SERIES_LEN {
        return Err(FacturaError::Numbering(format!(
            "series '{series}' exceeds {MAX_SERIES_LEN} characters"
        )));
    }
    if !series.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FacturaError::Numbering(format!(
            "series '{series}' must contain only letters and digits"
        )));
    }
    if series.ends_with(|c: char| c.is_ascii_digit()) {
        return Err(FacturaError::Numbering(format!(
            "series '{series}' must not end in a digit"
        )));
    }
    Ok(())
}
