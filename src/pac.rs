//! HTTP client for a certification provider (PAC).
//!
//! The provider is treated as an opaque endpoint: the CFDI XML is POSTed as
//! `application/xml` with HTTP basic auth and the response body is the
//! stamped XML. Provider-specific SOAP/REST envelopes are out of scope.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::FacturaError;
use crate::stamping::{DEFAULT_STAMP_TIMEOUT_SECS, PacCredentials, StampingAuthority};

/// Connection settings for [`HttpPac`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacConfig {
    pub endpoint: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_STAMP_TIMEOUT_SECS
}

impl std::fmt::Debug for PacConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacConfig")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &"***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PacConfig {
    pub fn credentials(&self) -> PacCredentials {
        PacCredentials::new(&self.user, &self.password)
    }
}

/// [`StampingAuthority`] over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpPac {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPac {
    pub fn new(config: &PacConfig) -> Result<Self, FacturaError> {
        if !config.endpoint.starts_with("http://") && !config.endpoint.starts_with("https://") {
            return Err(FacturaError::Config(format!(
                "PAC endpoint must be an http(s) URL, got '{}'",
                config.endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FacturaError::Config(format!("PAC client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl StampingAuthority for HttpPac {
    async fn submit(
        &self,
        xml: &[u8],
        credentials: &PacCredentials,
    ) -> Result<Vec<u8>, FacturaError> {
        debug!(endpoint = %self.endpoint, bytes = xml.len(), "submitting CFDI for certification");
        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&credentials.user, Some(&credentials.password))
            .header(reqwest::header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(xml.to_vec())
            .send()
            .await
            .map_err(|e| FacturaError::StampFailed(format!("PAC request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FacturaError::StampFailed(format!("PAC response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(FacturaError::StampFailed(format!(
                "PAC returned HTTP {status}: {}",
                String::from_utf8_lossy(&body).trim()
            )));
        }
        Ok(body.to_vec())
    }
}
