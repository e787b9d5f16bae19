use crate::db_types::{LedgerEntry, Order, PaymentSplit};

#[derive(Debug, Clone)]
pub enum InsertOrderResult {
    Inserted(Order),
    AlreadyExists(Order),
}

/// The outcome of the atomic split-and-ledger insert.
#[derive(Debug, Clone)]
pub enum InsertSplitResult {
    /// The split was created, locked and its three forward entries written in this call.
    Inserted(PaymentSplit, Vec<LedgerEntry>),
    /// A split already existed for the order. The existing split and all its entries are returned.
    AlreadyExists(PaymentSplit, Vec<LedgerEntry>),
}

#[derive(Debug, Clone)]
pub enum ReverseSplitResult {
    /// The order never had a split, so there is nothing to undo.
    NothingToReverse,
    /// The reversal entries in `entries` were written in this call.
    Reversed { split: PaymentSplit, entries: Vec<LedgerEntry> },
    /// The order had already been reversed. `entries` holds every entry for the order.
    AlreadyReversed { split: PaymentSplit, entries: Vec<LedgerEntry> },
}

#[derive(Debug, Clone)]
pub struct MarkPaidResult {
    pub entry: LedgerEntry,
    /// Set if paying this entry completed the split, which is now `settled`.
    pub settled_split: Option<PaymentSplit>,
}
