//! The three-way split of an order's total between supplier, reseller and platform.
//!
//! The platform takes its commission off the top. What remains is divided between the supplier and the reseller in
//! proportion to the supplier cost and the reseller margin recorded on the order's items. Both of those shares are
//! rounded down, so any sub-cent residual lands on the platform and the supplier and reseller amounts are never
//! adjusted to make the books balance.
use sle_common::Money;

use crate::{
    db_types::{AllocationMode, NewPaymentSplit, Order, PaymentSplit},
    helpers::{validate_commission_percent, validate_split_amounts, ValidationError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitAmounts {
    pub supplier_amount: Money,
    pub reseller_amount: Money,
    pub platform_amount: Money,
    pub total_amount: Money,
}

impl From<&NewPaymentSplit> for SplitAmounts {
    fn from(split: &NewPaymentSplit) -> Self {
        Self {
            supplier_amount: split.supplier_amount,
            reseller_amount: split.reseller_amount,
            platform_amount: split.platform_amount,
            total_amount: split.total_amount,
        }
    }
}

impl From<&PaymentSplit> for SplitAmounts {
    fn from(split: &PaymentSplit) -> Self {
        Self {
            supplier_amount: split.supplier_amount,
            reseller_amount: split.reseller_amount,
            platform_amount: split.platform_amount,
            total_amount: split.total_amount,
        }
    }
}

/// The result of [`compute_split`], along with the working that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCalculation {
    pub amounts: SplitAmounts,
    /// The commission before the rounding residual was added
    pub nominal_platform_fee: Money,
    /// `platform_amount - nominal_platform_fee`. Always less than one cent per payee.
    pub rounding_residual: Money,
    pub allocation: AllocationMode,
}

/// Computes the split for an order at the given commission percentage.
///
/// This is a pure function. It only fails if the inputs are out of range: a commission outside [0, 100], a negative
/// total, or item cost data that would give a negative share.
pub fn compute_split(order: &Order, commission_percent: f64) -> Result<SplitCalculation, ValidationError> {
    validate_commission_percent(commission_percent)?;
    let oid = &order.order_id;
    let total = order.total_amount;
    if total.is_negative() {
        return Err(ValidationError::NegativeAmount { order_id: oid.clone(), field: "total amount", amount: total });
    }
    let mut supplier_weight = 0i128;
    let mut reseller_weight = 0i128;
    for item in &order.items {
        let margin = item.unit_price - item.supplier_price;
        if item.quantity < 0 || item.supplier_price.is_negative() || margin.is_negative() {
            return Err(ValidationError::MalformedOrder(
                oid.clone(),
                format!("Item {} cannot be split with the recorded cost data", item.sku),
            ));
        }
        let qty = i128::from(item.quantity);
        supplier_weight += i128::from(item.supplier_price.value()) * qty;
        reseller_weight += i128::from(margin.value()) * qty;
    }

    let nominal_platform_fee = total.percentage(commission_percent);
    let remainder = total - nominal_platform_fee;
    let weight = supplier_weight + reseller_weight;
    let (supplier_amount, reseller_amount, allocation) = if weight == 0 {
        (remainder, Money::ZERO, AllocationMode::SupplierOnly)
    } else {
        let r = i128::from(remainder.value());
        // Both shares are bounded by `remainder`, so they fit back into an i64
        #[allow(clippy::cast_possible_truncation)]
        let supplier = Money::from_cents((r * supplier_weight / weight) as i64);
        #[allow(clippy::cast_possible_truncation)]
        let reseller = Money::from_cents((r * reseller_weight / weight) as i64);
        (supplier, reseller, AllocationMode::ItemMargin)
    };
    let platform_amount = total - supplier_amount - reseller_amount;
    let amounts = SplitAmounts { supplier_amount, reseller_amount, platform_amount, total_amount: total };
    validate_split_amounts(oid, &amounts)?;
    Ok(SplitCalculation {
        amounts,
        nominal_platform_fee,
        rounding_residual: platform_amount - nominal_platform_fee,
        allocation,
    })
}
