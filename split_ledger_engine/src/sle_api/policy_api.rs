use std::time::Duration;

use log::*;

use crate::{
    db::traits::PolicyProvider,
    db_types::{PolicySource, TierPolicy},
    helpers::{validate_commission_percent, validate_settlement_delay},
};

pub const DEFAULT_COMMISSION_PERCENT: f64 = 5.0;
pub const DEFAULT_SETTLEMENT_DELAY_DAYS: i64 = 7;
pub const DEFAULT_POLICY_LOOKUP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyDefaults {
    pub commission_percent: f64,
    pub settlement_delay_days: i64,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self { commission_percent: DEFAULT_COMMISSION_PERCENT, settlement_delay_days: DEFAULT_SETTLEMENT_DELAY_DAYS }
    }
}

/// The commission and delay to apply to a split, and where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPolicy {
    pub commission_percent: f64,
    pub settlement_delay_days: i64,
    pub source: PolicySource,
}

/// Resolves the policy for a supplier, falling back to the defaults whenever the tier system cannot give a usable
/// answer in time.
#[derive(Debug, Clone)]
pub struct PolicyResolver<P> {
    provider: P,
    defaults: PolicyDefaults,
    timeout: Duration,
}

impl<P> PolicyResolver<P> {
    pub fn new(provider: P, defaults: PolicyDefaults, timeout: Duration) -> Self {
        Self { provider, defaults, timeout }
    }

    pub fn defaults(&self) -> PolicyDefaults {
        self.defaults
    }

    fn default_policy(&self, source: PolicySource) -> ResolvedPolicy {
        ResolvedPolicy {
            commission_percent: self.defaults.commission_percent,
            settlement_delay_days: self.defaults.settlement_delay_days,
            source,
        }
    }

    fn fallback(&self, supplier_id: &str, reason: String) -> ResolvedPolicy {
        warn!("🔀️ Commission policy lookup for supplier {supplier_id} failed. Using the defaults. {reason}");
        self.default_policy(PolicySource::DefaultAfterFailure { reason })
    }

    fn apply_tier(&self, supplier_id: &str, tier: TierPolicy) -> ResolvedPolicy {
        if tier.commission_percent.is_none() && tier.settlement_delay_days.is_none() {
            trace!("🔀️ Tier {} for supplier {supplier_id} overrides nothing", tier.name);
            return self.default_policy(PolicySource::Default);
        }
        let commission_percent = tier.commission_percent.unwrap_or(self.defaults.commission_percent);
        let settlement_delay_days = tier.settlement_delay_days.unwrap_or(self.defaults.settlement_delay_days);
        if let Err(e) = validate_commission_percent(commission_percent) {
            return self.fallback(supplier_id, format!("Tier {} is unusable. {e}", tier.name));
        }
        if let Err(e) = validate_settlement_delay(settlement_delay_days) {
            return self.fallback(supplier_id, format!("Tier {} is unusable. {e}", tier.name));
        }
        debug!(
            "🔀️ Supplier {supplier_id} is on tier {}: {commission_percent}% commission, {settlement_delay_days} day delay",
            tier.name
        );
        ResolvedPolicy { commission_percent, settlement_delay_days, source: PolicySource::Tier { tier: tier.name } }
    }
}

impl<P> PolicyResolver<P>
where P: PolicyProvider
{
    /// Never fails. Timeouts, lookup errors and out-of-range tier values all resolve to the defaults, and the reason
    /// is recorded in the returned [`PolicySource`].
    pub async fn resolve_policy(&self, supplier_id: &str) -> ResolvedPolicy {
        match tokio::time::timeout(self.timeout, self.provider.fetch_tier_for_supplier(supplier_id)).await {
            Err(_) => self.fallback(supplier_id, format!("The lookup timed out after {}ms", self.timeout.as_millis())),
            Ok(Err(e)) => self.fallback(supplier_id, e.to_string()),
            Ok(Ok(None)) => self.default_policy(PolicySource::Default),
            Ok(Ok(Some(tier))) => self.apply_tier(supplier_id, tier),
        }
    }
}
