use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    config::SplitLedgerConfig,
    db::traits::{AuditLog, MarkPaidResult, SplitLedgerDatabase, SplitLedgerError},
    db_types::{EntityType, LedgerEntry, LedgerSummary, NewAuditEntry, OrderId},
    events::{EventProducers, SplitSettledEvent},
    helpers::validate_payout_reference,
    sle_api::{retry::RetryPolicy, split_objects::SplitWithLedger},
};

/// `PayoutApi` records payouts against the ledger, and serves the read-only views used by dashboards.
///
/// The engine never moves money itself. Once the payout has been executed elsewhere, call [`PayoutApi::mark_paid`]
/// with the external transfer reference.
pub struct PayoutApi<B> {
    db: B,
    producers: EventProducers,
    retry: RetryPolicy,
    audit_enabled: bool,
}

impl<B> Debug for PayoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B> PayoutApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, retry: RetryPolicy::default(), audit_enabled: true }
    }

    pub fn from_config(db: B, producers: EventProducers, config: &SplitLedgerConfig) -> Self {
        Self { db, producers, retry: config.retry_policy(), audit_enabled: config.audit_enabled }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }
}

impl<B> PayoutApi<B>
where B: SplitLedgerDatabase + AuditLog
{
    /// Marks the ledger entry as paid.
    ///
    /// Fails with [`SplitLedgerError::AlreadyPaid`] if it has been paid before, and with
    /// [`SplitLedgerError::NotEligible`] if its settlement delay has not yet elapsed. Neither failure changes anything.
    /// If this was the last unpaid entry for the order, the split is settled and `payment.split.settled` is published.
    pub async fn mark_paid(&self, entry_id: i64, payout_reference: &str) -> Result<MarkPaidResult, SplitLedgerError> {
        validate_payout_reference(entry_id, payout_reference)?;
        let result = self
            .retry
            .run("Payout", || self.db.mark_entry_paid(entry_id, payout_reference, Utc::now()))
            .await
            .map_err(|e| {
                debug!("💸️ Ledger entry {entry_id} was not marked as paid. {e}");
                e
            })?;
        let entry = &result.entry;
        info!(
            "💸️ {} paid to {} {} for order {} (ref {payout_reference})",
            entry.amount, entry.entity_type, entry.entity_id, entry.order_id
        );
        self.record_audit(NewAuditEntry::new(
            entry.order_id.clone(),
            "ledger.paid",
            json!({ "entry_id": entry.id, "amount": entry.amount, "payout_reference": payout_reference }),
        ))
        .await;
        if let Some(split) = &result.settled_split {
            info!("💸️ Every entry for order {} has been paid. Split {} is settled.", split.order_id, split.id);
            self.record_audit(NewAuditEntry::new(
                split.order_id.clone(),
                "split.settled",
                json!({ "split_id": split.id, "final_entry_id": entry.id }),
            ))
            .await;
            self.producers.publish_split_settled(SplitSettledEvent::new(split.clone(), entry.clone()));
        }
        Ok(result)
    }

    /// The unpaid entries for the payee whose settlement delay has elapsed, excluding cancelled and returned orders.
    pub async fn get_eligible_payouts(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
        self.db.fetch_eligible_entries(entity_type, entity_id, Utc::now()).await
    }

    /// Signed totals for the payee. Reversals reduce the totals.
    pub async fn summarize(&self, entity_type: EntityType, entity_id: &str) -> Result<LedgerSummary, SplitLedgerError> {
        self.db.summarize_entries(entity_type, entity_id, Utc::now()).await
    }

    pub async fn get_split_and_ledger(&self, order_id: &OrderId) -> Result<Option<SplitWithLedger>, SplitLedgerError> {
        let result = self.db.fetch_split_and_ledger(order_id).await?;
        Ok(result.map(|(split, entries)| SplitWithLedger { split, entries }))
    }

    /// Promotes every pending entry whose settlement delay has elapsed to `eligible`. Returns how many were promoted.
    ///
    /// Queries treat such entries as eligible whether or not this has run, so it only affects the stored status.
    pub async fn refresh_eligibility(&self) -> Result<u64, SplitLedgerError> {
        let promoted = self.retry.run("Eligibility refresh", || self.db.promote_eligible_entries(Utc::now())).await?;
        if promoted > 0 {
            info!("💸️ {promoted} ledger entries are now eligible for payout");
        }
        Ok(promoted)
    }

    async fn record_audit(&self, entry: NewAuditEntry) {
        if !self.audit_enabled {
            return;
        }
        let action = entry.action.clone();
        if let Err(e) = self.db.record_audit(entry).await {
            warn!("💸️ Could not write the {action} audit record. The payout has already been recorded. {e}");
        }
    }
}
