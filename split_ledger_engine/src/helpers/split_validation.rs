//! Pre-commit validation for payment splits.
//!
//! These checks run before every write of a split. They are plain functions so that they can be exercised without a
//! database, and so that every backend applies exactly the same rules.
use chrono::{DateTime, Duration, Utc};
use sle_common::Money;
use thiserror::Error;

use crate::{
    db_types::{NewPaymentSplit, Order, OrderId, OrderStatus, PaymentSplit, PaymentStatus, SplitStatus, SplitUpdate},
    helpers::SplitAmounts,
};

/// The three components of a split must add up to the total to within less than this amount.
pub const RECONCILIATION_TOLERANCE: Money = Money::from_cents(1);
/// Ten years. Longer delays are treated as configuration mistakes.
pub const MAX_SETTLEMENT_DELAY_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(
        "The split for order {order_id} does not reconcile. {supplier} + {reseller} + {platform} does not equal \
         {total}"
    )]
    ReconciliationMismatch { order_id: OrderId, supplier: Money, reseller: Money, platform: Money, total: Money },
    #[error("The {field} for order {order_id} cannot be negative ({amount})")]
    NegativeAmount { order_id: OrderId, field: &'static str, amount: Money },
    #[error("Order {0} is malformed. {1}")]
    MalformedOrder(OrderId, String),
    #[error("Order {order_id} is not eligible for a payment split. Status: {status}, payment status: {payment_status}")]
    OrderNotEligible { order_id: OrderId, status: OrderStatus, payment_status: PaymentStatus },
    #[error("Commission percentage {0} is not within [0, 100]")]
    CommissionOutOfRange(f64),
    #[error("Settlement delay of {0} days is not within [0, {MAX_SETTLEMENT_DELAY_DAYS}]")]
    SettlementDelayOutOfRange(i64),
    #[error("The split for order {0} is {1} and its amounts can no longer be changed")]
    ImmutableSplit(OrderId, SplitStatus),
    #[error("The split for order {order_id} cannot move from {from} to {to}")]
    IllegalTransition { order_id: OrderId, from: SplitStatus, to: SplitStatus },
    #[error("A payout reference is required to mark ledger entry {0} as paid")]
    MissingPayoutReference(i64),
}

pub fn validate_settlement_delay(days: i64) -> Result<(), ValidationError> {
    if (0..=MAX_SETTLEMENT_DELAY_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(ValidationError::SettlementDelayOutOfRange(days))
    }
}

/// The moment ledger entries created at `from` become eligible for payout.
pub fn settlement_date(from: DateTime<Utc>, delay_days: i64) -> Result<DateTime<Utc>, ValidationError> {
    validate_settlement_delay(delay_days)?;
    from.checked_add_signed(Duration::days(delay_days)).ok_or(ValidationError::SettlementDelayOutOfRange(delay_days))
}

pub fn validate_commission_percent(percent: f64) -> Result<(), ValidationError> {
    if percent.is_finite() && (0.0..=100.0).contains(&percent) {
        Ok(())
    } else {
        Err(ValidationError::CommissionOutOfRange(percent))
    }
}

/// Checks that none of the amounts are negative, and that the three components reconcile to the total.
pub fn validate_split_amounts(order_id: &OrderId, amounts: &SplitAmounts) -> Result<(), ValidationError> {
    let fields = [
        ("total amount", amounts.total_amount),
        ("supplier amount", amounts.supplier_amount),
        ("reseller amount", amounts.reseller_amount),
        ("platform amount", amounts.platform_amount),
    ];
    if let Some((field, amount)) = fields.iter().find(|(_, a)| a.is_negative()) {
        return Err(ValidationError::NegativeAmount { order_id: order_id.clone(), field: *field, amount: *amount });
    }
    let sum = amounts.supplier_amount + amounts.reseller_amount + amounts.platform_amount;
    if (sum - amounts.total_amount).abs() >= RECONCILIATION_TOLERANCE {
        return Err(ValidationError::ReconciliationMismatch {
            order_id: order_id.clone(),
            supplier: amounts.supplier_amount,
            reseller: amounts.reseller_amount,
            platform: amounts.platform_amount,
            total: amounts.total_amount,
        });
    }
    Ok(())
}

pub fn validate_new_split(split: &NewPaymentSplit) -> Result<(), ValidationError> {
    let oid = &split.order_id;
    if oid.as_str().trim().is_empty() {
        return Err(ValidationError::MalformedOrder(oid.clone(), "The order id is empty".into()));
    }
    if split.supplier_id.trim().is_empty() || split.reseller_id.trim().is_empty() {
        return Err(ValidationError::MalformedOrder(oid.clone(), "Supplier and reseller ids are required".into()));
    }
    validate_commission_percent(split.metadata.commission_percent)?;
    validate_split_amounts(oid, &SplitAmounts::from(split))
}

/// Checks that the order is in a state that allows a split, and that its cost data is usable.
pub fn validate_order_for_split(order: &Order) -> Result<(), ValidationError> {
    let oid = &order.order_id;
    if !order.is_split_eligible() {
        return Err(ValidationError::OrderNotEligible {
            order_id: oid.clone(),
            status: order.status,
            payment_status: order.payment_status,
        });
    }
    if oid.as_str().trim().is_empty() {
        return Err(ValidationError::MalformedOrder(oid.clone(), "The order id is empty".into()));
    }
    if order.supplier_id.trim().is_empty() || order.reseller_id.trim().is_empty() {
        return Err(ValidationError::MalformedOrder(oid.clone(), "Supplier and reseller ids are required".into()));
    }
    if order.total_amount.is_negative() {
        return Err(ValidationError::NegativeAmount {
            order_id: oid.clone(),
            field: "total amount",
            amount: order.total_amount,
        });
    }
    for item in &order.items {
        if item.quantity <= 0 {
            return Err(ValidationError::MalformedOrder(
                oid.clone(),
                format!("Item {} has a non-positive quantity ({})", item.sku, item.quantity),
            ));
        }
        if item.unit_price.is_negative() || item.supplier_price.is_negative() {
            return Err(ValidationError::MalformedOrder(oid.clone(), format!("Item {} has a negative price", item.sku)));
        }
        if item.supplier_price > item.unit_price {
            return Err(ValidationError::MalformedOrder(
                oid.clone(),
                format!(
                    "Item {} costs the reseller {} but sells for {}",
                    item.sku, item.supplier_price, item.unit_price
                ),
            ));
        }
    }
    Ok(())
}

pub fn validate_status_transition(order_id: &OrderId, from: SplitStatus, to: SplitStatus) -> Result<(), ValidationError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ValidationError::IllegalTransition { order_id: order_id.clone(), from, to })
    }
}

pub fn validate_payout_reference(entry_id: i64, payout_reference: &str) -> Result<(), ValidationError> {
    if payout_reference.trim().is_empty() {
        Err(ValidationError::MissingPayoutReference(entry_id))
    } else {
        Ok(())
    }
}

/// Validates an administrative change against the current state of the split.
///
/// Once a split has left `pending`, only its status may change, and only along `locked -> settled`. While pending,
/// any change of amounts must still reconcile.
pub fn validate_split_update(split: &PaymentSplit, update: &SplitUpdate) -> Result<(), ValidationError> {
    let oid = &split.order_id;
    if split.status.is_frozen() && update.changes_frozen_fields() {
        return Err(ValidationError::ImmutableSplit(oid.clone(), split.status));
    }
    if let Some(to) = update.status {
        if to != split.status {
            validate_status_transition(oid, split.status, to)?;
        }
    }
    let amounts = SplitAmounts {
        supplier_amount: update.supplier_amount.unwrap_or(split.supplier_amount),
        reseller_amount: update.reseller_amount.unwrap_or(split.reseller_amount),
        platform_amount: update.platform_amount.unwrap_or(split.platform_amount),
        total_amount: update.total_amount.unwrap_or(split.total_amount),
    };
    validate_split_amounts(oid, &amounts)
}
