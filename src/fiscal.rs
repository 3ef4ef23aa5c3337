//! Issuer fiscal data resolution with an explicit fallback policy.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::core::{FacturaError, FiscalData};
use crate::store::FiscalDataStore;

/// Fiscal data resolved for a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFiscalData {
    pub data: FiscalData,
    /// Account the data belongs to.
    pub owner_id: String,
    /// The requesting user had no fiscal data and the fallback account's
    /// identity is being used. Must be surfaced to operators.
    pub borrowed: bool,
}

/// Look up `user_id`'s fiscal data, falling back to `fallback_user_id`.
///
/// - The user's own record wins when present.
/// - Otherwise, if a fallback account is configured and differs from the
///   user, its record is returned with `borrowed = true`.
/// - Otherwise `NoFiscalDataConfigured`.
pub async fn resolve_with_fallback(
    store: &dyn FiscalDataStore,
    user_id: &str,
    fallback_user_id: Option<&str>,
) -> Result<ResolvedFiscalData, FacturaError> {
    if let Some(data) = store
        .get(user_id)
        .await
        .map_err(|e| e.during(format!("loading fiscal data for '{user_id}'")))?
    {
        return Ok(ResolvedFiscalData {
            data,
            owner_id: user_id.to_string(),
            borrowed: false,
        });
    }

    let fallback = match fallback_user_id {
        Some(f) if f != user_id => f,
        _ => {
            return Err(FacturaError::NoFiscalDataConfigured {
                user_id: user_id.to_string(),
            });
        }
    };

    let data = store
        .get(fallback)
        .await
        .map_err(|e| e.during(format!("loading fallback fiscal data for '{fallback}'")))?
        .ok_or_else(|| FacturaError::NoFiscalDataConfigured {
            user_id: user_id.to_string(),
        })?;

    warn!(
        user_id,
        fallback_user_id = fallback,
        rfc = %data.rfc,
        "no fiscal data for user, borrowing fallback issuer identity"
    );
    Ok(ResolvedFiscalData {
        data,
        owner_id: fallback.to_string(),
        borrowed: true,
    })
}

/// Resolver bound to a store and a configured fallback account.
#[derive(Clone)]
pub struct FiscalResolver {
    store: Arc<dyn FiscalDataStore>,
    fallback_user_id: Option<String>,
}

impl FiscalResolver {
    pub fn new(store: Arc<dyn FiscalDataStore>) -> Self {
        Self {
            store,
            fallback_user_id: None,
        }
    }

    /// Designate the administrator account whose identity is borrowed.
    pub fn with_fallback(mut self, user_id: impl Into<String>) -> Self {
        self.fallback_user_id = Some(user_id.into());
        self
    }

    pub async fn resolve(&self, user_id: &str) -> Result<ResolvedFiscalData, FacturaError> {
        resolve_with_fallback(
            self.store.as_ref(),
            user_id,
            self.fallback_user_id.as_deref(),
        )
        .await
    }
}
