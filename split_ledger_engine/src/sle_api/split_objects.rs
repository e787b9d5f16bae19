use serde::{Deserialize, Serialize};

use crate::db_types::{EntryKind, LedgerEntry, PaymentSplit};

/// The result of the forward path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub split: PaymentSplit,
    pub entries: Vec<LedgerEntry>,
    /// True if the split already existed and this call wrote nothing.
    pub already_processed: bool,
}

/// The result of the reversal path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReversalOutcome {
    /// The order never got a split, typically because it was cancelled before payment.
    NothingToReverse,
    Reversed {
        split: PaymentSplit,
        /// The reversal entries for the order
        entries: Vec<LedgerEntry>,
        /// True if the order had already been reversed and this call wrote nothing.
        already_processed: bool,
    },
}

impl ReversalOutcome {
    pub fn already_processed(&self) -> bool {
        match self {
            ReversalOutcome::NothingToReverse => false,
            ReversalOutcome::Reversed { already_processed, .. } => *already_processed,
        }
    }

    pub fn split(&self) -> Option<&PaymentSplit> {
        match self {
            ReversalOutcome::NothingToReverse => None,
            ReversalOutcome::Reversed { split, .. } => Some(split),
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        match self {
            ReversalOutcome::NothingToReverse => &[],
            ReversalOutcome::Reversed { entries, .. } => entries,
        }
    }
}

/// A split and every ledger entry written against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitWithLedger {
    pub split: PaymentSplit,
    pub entries: Vec<LedgerEntry>,
}

impl SplitWithLedger {
    pub fn forward_entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Forward)
    }

    pub fn reversal_entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Reversal)
    }

    pub fn is_reversed(&self) -> bool {
        self.reversal_entries().next().is_some()
    }
}
