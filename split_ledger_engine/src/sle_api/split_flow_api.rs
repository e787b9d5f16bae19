use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    config::SplitLedgerConfig,
    db::traits::{AuditLog, InsertSplitResult, PolicyProvider, ReverseSplitResult, SplitLedgerDatabase, SplitLedgerError},
    db_types::{EntryKind, NewAuditEntry, NewPaymentSplit, Order, OrderId, PaymentSplit, SplitMetadata, SplitUpdate},
    events::{EventProducers, SplitCreatedEvent, SplitReversedEvent},
    helpers::{compute_split, settlement_date, validate_order_for_split},
    sle_api::{
        policy_api::PolicyResolver,
        retry::RetryPolicy,
        split_objects::{ReversalOutcome, SplitOutcome},
    },
};

/// `SplitFlowApi` decides how an order's money divides, once its payment is confirmed, and undoes that decision when
/// the order is cancelled or refunded.
///
/// Both paths are idempotent. Webhook retries and duplicate deliveries always receive the result of the first
/// successful call, flagged as `already_processed`.
pub struct SplitFlowApi<B, P> {
    db: B,
    policy: PolicyResolver<P>,
    producers: EventProducers,
    retry: RetryPolicy,
    audit_enabled: bool,
}

impl<B, P> Debug for SplitFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SplitFlowApi")
    }
}

impl<B, P> SplitFlowApi<B, P> {
    pub fn new(db: B, policy: PolicyResolver<P>, producers: EventProducers) -> Self {
        Self { db, policy, producers, retry: RetryPolicy::default(), audit_enabled: true }
    }

    /// Builds the API with the policy defaults, timeouts and audit setting from `config`.
    pub fn from_config(db: B, provider: P, producers: EventProducers, config: &SplitLedgerConfig) -> Self {
        let policy = PolicyResolver::new(provider, config.policy_defaults(), config.policy_lookup_timeout);
        Self { db, policy, producers, retry: config.retry_policy(), audit_enabled: config.audit_enabled }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, P> SplitFlowApi<B, P>
where
    B: SplitLedgerDatabase + AuditLog,
    P: PolicyProvider,
{
    /// The forward path. Call this once the order's payment has been confirmed.
    ///
    /// If the order already has a split, it is returned unchanged. Otherwise the commission policy for the supplier
    /// is resolved, the split is computed and validated, and the locked split and its three ledger entries are
    /// written in a single transaction. `payment_method` defaults to the one recorded on the order.
    ///
    /// The `payment.split.created` event and the audit record are only emitted once that transaction has committed.
    pub async fn on_order_confirmed(
        &self,
        order: &Order,
        payment_id: Option<String>,
        payment_method: Option<String>,
    ) -> Result<SplitOutcome, SplitLedgerError> {
        let order_id = &order.order_id;
        // Fast path for retried deliveries. The authoritative check is repeated inside the write transaction.
        if let Some((split, entries)) = self.db.fetch_split_and_ledger(order_id).await? {
            debug!("🔀️ Order {order_id} already has split {}. Returning it.", split.id);
            return Ok(SplitOutcome { split, entries, already_processed: true });
        }
        validate_order_for_split(order).map_err(|e| {
            warn!("🔀️ Order {order_id} cannot be split. {e}");
            SplitLedgerError::from(e)
        })?;
        let policy = self.policy.resolve_policy(&order.supplier_id).await;
        let calc = compute_split(order, policy.commission_percent)?;
        let metadata = SplitMetadata {
            commission_percent: policy.commission_percent,
            settlement_delay_days: policy.settlement_delay_days,
            nominal_platform_fee: calc.nominal_platform_fee,
            rounding_residual: calc.rounding_residual,
            allocation: calc.allocation,
            policy: policy.source,
        };
        let new_split = NewPaymentSplit {
            store_id: order.store_id.clone(),
            order_id: order_id.clone(),
            payment_id,
            total_amount: calc.amounts.total_amount,
            supplier_id: order.supplier_id.clone(),
            supplier_amount: calc.amounts.supplier_amount,
            reseller_id: order.reseller_id.clone(),
            reseller_amount: calc.amounts.reseller_amount,
            platform_amount: calc.amounts.platform_amount,
            payment_method: payment_method.unwrap_or_else(|| order.payment_method.clone()),
            metadata,
        };
        let available_at = settlement_date(Utc::now(), policy.settlement_delay_days)?;
        let result = self
            .retry
            .run("Split creation", || self.db.insert_locked_split(new_split.clone(), available_at))
            .await?;
        match result {
            InsertSplitResult::Inserted(split, entries) => {
                info!(
                    "🔀️ Split {} locked for order {order_id}. Supplier {}, reseller {}, platform {}",
                    split.id, split.supplier_amount, split.reseller_amount, split.platform_amount
                );
                self.record_audit(NewAuditEntry::new(
                    order_id.clone(),
                    "split.created",
                    json!({
                        "split_id": split.id,
                        "supplier_amount": split.supplier_amount,
                        "reseller_amount": split.reseller_amount,
                        "platform_amount": split.platform_amount,
                        "policy": split.metadata.policy,
                    }),
                ))
                .await;
                self.producers.publish_split_created(SplitCreatedEvent::new(split.clone(), entries.clone()));
                Ok(SplitOutcome { split, entries, already_processed: false })
            },
            InsertSplitResult::AlreadyExists(split, entries) => {
                debug!("🔀️ Split for order {order_id} was created by a concurrent call. Returning it.");
                Ok(SplitOutcome { split, entries, already_processed: true })
            },
        }
    }

    /// The reversal path. Call this when an order is cancelled or refunded.
    ///
    /// Orders without a split are reported as [`ReversalOutcome::NothingToReverse`]. Otherwise a negative entry is
    /// appended for each forward entry and the split is settled. Repeated calls write nothing and return the existing
    /// reversal.
    pub async fn on_order_reversed(&self, order_id: &OrderId, reason: &str) -> Result<ReversalOutcome, SplitLedgerError> {
        let result = self.retry.run("Split reversal", || self.db.reverse_split(order_id, reason, Utc::now())).await?;
        match result {
            ReverseSplitResult::NothingToReverse => {
                info!("🔀️ Order {order_id} has no payment split. There is nothing to reverse.");
                Ok(ReversalOutcome::NothingToReverse)
            },
            ReverseSplitResult::AlreadyReversed { split, entries } => {
                debug!("🔀️ Order {order_id} was already reversed. Nothing was written.");
                let entries = entries.into_iter().filter(|e| e.kind == EntryKind::Reversal).collect();
                Ok(ReversalOutcome::Reversed { split, entries, already_processed: true })
            },
            ReverseSplitResult::Reversed { split, entries } => {
                info!("🔀️ Split {} for order {order_id} reversed. Reason: {reason}", split.id);
                self.record_audit(NewAuditEntry::new(
                    order_id.clone(),
                    "split.reversed",
                    json!({
                        "split_id": split.id,
                        "reason": reason,
                        "entries": entries
                            .iter()
                            .map(|e| json!({ "id": e.id, "entity_type": e.entity_type, "amount": e.amount }))
                            .collect::<Vec<_>>(),
                    }),
                ))
                .await;
                self.producers.publish_split_reversed(SplitReversedEvent::new(split.clone(), entries.clone(), reason));
                Ok(ReversalOutcome::Reversed { split, entries, already_processed: false })
            },
        }
    }

    /// Administrative correction of a split.
    ///
    /// Only the status of a locked split can change, and only to `settled`. Amount changes are only accepted while a
    /// split is pending, and must still reconcile.
    pub async fn update_split(&self, order_id: &OrderId, update: SplitUpdate) -> Result<PaymentSplit, SplitLedgerError> {
        let details = json!({
            "total_amount": update.total_amount,
            "supplier_amount": update.supplier_amount,
            "reseller_amount": update.reseller_amount,
            "platform_amount": update.platform_amount,
            "payment_id": update.payment_id,
            "payment_method": update.payment_method,
            "status": update.status,
        });
        let split = self.retry.run("Split update", || self.db.update_split(order_id, update.clone())).await?;
        self.record_audit(NewAuditEntry::new(order_id.clone(), "split.updated", details).with_actor("admin")).await;
        Ok(split)
    }

    pub async fn fetch_split(&self, order_id: &OrderId) -> Result<Option<PaymentSplit>, SplitLedgerError> {
        self.db.fetch_split_for_order(order_id).await
    }

    async fn record_audit(&self, entry: NewAuditEntry) {
        if !self.audit_enabled {
            return;
        }
        let action = entry.action.clone();
        if let Err(e) = self.db.record_audit(entry).await {
            warn!("🔀️ Could not write the {action} audit record. The transaction has already committed. {e}");
        }
    }
}
