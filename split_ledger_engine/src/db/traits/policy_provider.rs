use thiserror::Error;

use crate::db_types::TierPolicy;

#[derive(Debug, Clone, Error)]
#[error("Commission tier lookup failed. {0}")]
pub struct PolicyLookupError(pub String);

impl From<sqlx::Error> for PolicyLookupError {
    fn from(e: sqlx::Error) -> Self {
        Self(e.to_string())
    }
}

/// Looks up the commission tier assigned to a supplier.
///
/// Implementations may fail. Callers go through [`crate::PolicyResolver`], which turns every failure into the default
/// policy.
#[allow(async_fn_in_trait)]
pub trait PolicyProvider {
    /// Returns the tier assigned to the supplier, or `None` if there is no assignment.
    async fn fetch_tier_for_supplier(&self, supplier_id: &str) -> Result<Option<TierPolicy>, PolicyLookupError>;
}

/// A provider for deployments without a tier system. Every supplier gets the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTierSystem;

impl PolicyProvider for NoTierSystem {
    async fn fetch_tier_for_supplier(&self, _supplier_id: &str) -> Result<Option<TierPolicy>, PolicyLookupError> {
        Ok(None)
    }
}
