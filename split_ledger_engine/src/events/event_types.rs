use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db_types::{LedgerEntry, PaymentSplit};

pub const SPLIT_CREATED: &str = "payment.split.created";
pub const SPLIT_REVERSED: &str = "payment.split.reversed";
pub const SPLIT_SETTLED: &str = "payment.split.settled";

fn entry_ids(entries: &[LedgerEntry]) -> Vec<i64> {
    entries.iter().map(|e| e.id).collect()
}

/// A split was created and locked, and its three forward ledger entries written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitCreatedEvent {
    pub split: PaymentSplit,
    pub entries: Vec<LedgerEntry>,
}

impl SplitCreatedEvent {
    pub fn new(split: PaymentSplit, entries: Vec<LedgerEntry>) -> Self {
        Self { split, entries }
    }

    pub fn name(&self) -> &'static str {
        SPLIT_CREATED
    }

    pub fn payload(&self) -> Value {
        let split = &self.split;
        json!({
            "order_id": split.order_id,
            "split_id": split.id,
            "store_id": split.store_id,
            "payment_id": split.payment_id,
            "total_amount": split.total_amount,
            "supplier_amount": split.supplier_amount,
            "reseller_amount": split.reseller_amount,
            "platform_amount": split.platform_amount,
            "commission_percent": split.metadata.commission_percent,
            "settlement_delay_days": split.metadata.settlement_delay_days,
            "tier_override_applied": split.metadata.policy.tier_override_applied(),
            "ledger_entry_ids": entry_ids(&self.entries),
        })
    }
}

/// A split was reversed. `entries` holds the negative entries written by the reversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitReversedEvent {
    pub split: PaymentSplit,
    pub entries: Vec<LedgerEntry>,
    pub reason: String,
}

impl SplitReversedEvent {
    pub fn new<S: Into<String>>(split: PaymentSplit, entries: Vec<LedgerEntry>, reason: S) -> Self {
        Self { split, entries, reason: reason.into() }
    }

    pub fn name(&self) -> &'static str {
        SPLIT_REVERSED
    }

    pub fn payload(&self) -> Value {
        let reversed = self.entries.iter().map(|e| e.amount).sum::<sle_common::Money>();
        json!({
            "order_id": self.split.order_id,
            "split_id": self.split.id,
            "reason": self.reason,
            "reversed_amount": reversed,
            "ledger_entry_ids": entry_ids(&self.entries),
        })
    }
}

/// Every ledger entry of the split has been paid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSettledEvent {
    pub split: PaymentSplit,
    /// The entry whose payout completed the split
    pub final_entry: LedgerEntry,
}

impl SplitSettledEvent {
    pub fn new(split: PaymentSplit, final_entry: LedgerEntry) -> Self {
        Self { split, final_entry }
    }

    pub fn name(&self) -> &'static str {
        SPLIT_SETTLED
    }

    pub fn payload(&self) -> Value {
        json!({
            "order_id": self.split.order_id,
            "split_id": self.split.id,
            "final_entry_id": self.final_entry.id,
            "payout_reference": self.final_entry.payout_reference,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    SplitCreated(SplitCreatedEvent),
    SplitReversed(SplitReversedEvent),
    SplitSettled(SplitSettledEvent),
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::SplitCreated(e) => e.name(),
            EventType::SplitReversed(e) => e.name(),
            EventType::SplitSettled(e) => e.name(),
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            EventType::SplitCreated(e) => e.payload(),
            EventType::SplitReversed(e) => e.payload(),
            EventType::SplitSettled(e) => e.payload(),
        }
    }
}

impl From<SplitCreatedEvent> for EventType {
    fn from(e: SplitCreatedEvent) -> Self {
        Self::SplitCreated(e)
    }
}

impl From<SplitReversedEvent> for EventType {
    fn from(e: SplitReversedEvent) -> Self {
        Self::SplitReversed(e)
    }
}

impl From<SplitSettledEvent> for EventType {
    fn from(e: SplitSettledEvent) -> Self {
        Self::SplitSettled(e)
    }
}
