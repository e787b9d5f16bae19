mod split_calculator;
mod split_validation;

pub use split_calculator::{compute_split, SplitAmounts, SplitCalculation};
pub use split_validation::{
    settlement_date,
    validate_commission_percent,
    validate_new_split,
    validate_order_for_split,
    validate_payout_reference,
    validate_settlement_delay,
    validate_split_amounts,
    validate_split_update,
    validate_status_transition,
    ValidationError,
    MAX_SETTLEMENT_DELAY_DAYS,
    RECONCILIATION_TOLERANCE,
};
