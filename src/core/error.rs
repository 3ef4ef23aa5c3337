use thiserror::Error;

/// Errors that can occur while assembling, rendering or stamping an invoice.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FacturaError {
    /// A durable collaborator (folio counter, fiscal data, history) could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A client-supplied folio was already issued for this series and issuer.
    #[error("folio {folio} already issued for series '{series}'")]
    DuplicateFolio { series: String, folio: u64 },

    /// Neither the user nor the fallback account has fiscal data.
    #[error("no fiscal data configured for user '{user_id}'")]
    NoFiscalDataConfigured { user_id: String },

    /// XML or PDF rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// The certification authority did not return a usable stamp.
    #[error("stamping failed: {0}")]
    StampFailed(String),

    /// One or more validation rules failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Folio formatting or parsing error.
    #[error("numbering error: {0}")]
    Numbering(String),

    /// Archive packaging error.
    #[error("archive error: {0}")]
    Archive(String),

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "receiver.rfc").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// CFDI rule code if applicable (e.g. "CFDI40102").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule code.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error with a CFDI rule code.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}

/// Join a list of validation errors into a single [`FacturaError::Validation`].
pub fn validation_failure(errors: &[ValidationError]) -> FacturaError {
    let msg = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    FacturaError::Validation(msg)
}
