//! Certification (stamping) of rendered invoices.
//!
//! An invoice moves `Unstamped -> Stamping -> Stamped | StampFailed`. A
//! failed stamp never fails the generation request: the folio is already
//! consumed, so the unstamped documents are still delivered and recorded
//! with the failure cause in [`Invoice::error_log`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::*;
use crate::xml::parse_stamped;

/// Default bound on one certification call.
pub const DEFAULT_STAMP_TIMEOUT_SECS: u64 = 30;

/// Account credentials at the certification provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacCredentials {
    pub user: String,
    pub password: String,
}

impl PacCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for PacCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// External certification authority (PAC).
#[async_trait]
pub trait StampingAuthority: Send + Sync {
    /// Submit CFDI XML and return the stamped XML.
    async fn submit(&self, xml: &[u8], credentials: &PacCredentials)
    -> Result<Vec<u8>, FacturaError>;
}

/// Whether and how long to stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampingConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for StampingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: DEFAULT_STAMP_TIMEOUT_SECS,
        }
    }
}

/// Drives the stamping state machine for one invoice at a time.
#[derive(Clone)]
pub struct StampingCoordinator {
    authority: Arc<dyn StampingAuthority>,
    credentials: PacCredentials,
    timeout: Duration,
}

impl std::fmt::Debug for StampingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampingCoordinator")
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StampingCoordinator {
    pub fn new(authority: Arc<dyn StampingAuthority>, credentials: PacCredentials) -> Self {
        Self {
            authority,
            credentials,
            timeout: Duration::from_secs(DEFAULT_STAMP_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stamp `invoice` using its rendered `xml`.
    ///
    /// Returns the terminal status. On success the stamp is attached; on
    /// failure `error_log` carries the cause and no stamp is attached.
    pub async fn stamp(&self, invoice: &mut Invoice, xml: &str) -> StampStatus {
        if invoice.status.is_terminal() {
            warn!(folio = %invoice.folio, status = invoice.status.label(), "invoice already in a terminal stamp state");
            return invoice.status;
        }
        invoice.status = StampStatus::Stamping;

        match self.certify(invoice, xml).await {
            Ok(stamp) => {
                info!(folio = %invoice.folio, uuid = %stamp.uuid, "invoice stamped");
                invoice.stamp = Some(stamp);
                invoice.error_log = None;
                invoice.status = StampStatus::Stamped;
            }
            Err(e) => {
                warn!(folio = %invoice.folio, error = %e, "stamping failed, delivering unstamped invoice");
                invoice.stamp = None;
                invoice.error_log = Some(e.to_string());
                invoice.status = StampStatus::StampFailed;
            }
        }
        invoice.status
    }

    async fn certify(&self, invoice: &Invoice, xml: &str) -> Result<DigitalStamp, FacturaError> {
        let call = self.authority.submit(xml.as_bytes(), &self.credentials);
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                FacturaError::StampFailed(format!(
                    "certification timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        let response = String::from_utf8(response)
            .map_err(|e| FacturaError::StampFailed(format!("stamped XML is not UTF-8: {e}")))?;
        let stamped = parse_stamped(&response)?;
        verify_identity(invoice, stamped.series.as_deref(), stamped.folio.as_deref())?;
        Ok(stamped.stamp)
    }
}

/// The stamped document must carry the same series and folio we submitted.
fn verify_identity(
    invoice: &Invoice,
    series: Option<&str>,
    folio: Option<&str>,
) -> Result<(), FacturaError> {
    let expected_series = Some(invoice.folio.series.as_str()).filter(|s| !s.is_empty());
    let series = series.filter(|s| !s.is_empty());
    if series != expected_series {
        return Err(FacturaError::StampFailed(format!(
            "stamped document series {:?} does not match {:?}",
            series.unwrap_or(""),
            invoice.folio.series
        )));
    }
    let digits = invoice.folio.digits();
    if folio != Some(digits.as_str()) {
        return Err(FacturaError::StampFailed(format!(
            "stamped document folio {:?} does not match {digits:?}",
            folio.unwrap_or("")
        )));
    }
    Ok(())
}
