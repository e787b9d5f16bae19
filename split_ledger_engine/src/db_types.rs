use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sle_common::Money;
use sqlx::{FromRow, Type};
use thiserror::Error;

/// The entity id used for ledger entries owed to the marketplace itself.
pub const PLATFORM_ENTITY_ID: &str = "platform";

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Implements `Display`, `FromStr` and a lenient `From<String>` for the lowercase text enums stored in the database.
macro_rules! text_enum {
    ($name:ident, $label:literal, $fallback:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ConversionError::new($label, s)),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!("Invalid {}: {value}. But this conversion cannot fail. Defaulting to {}", $label, Self::$fallback);
                    Self::$fallback
                })
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The business identifier of an order. This is the cross-system join key used by invoicing and analytics, and is
/// deliberately *not* the storage primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     OrderStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// The order has been placed, but not yet confirmed.
    Pending,
    /// The order has been confirmed. This is the usual trigger for creating a payment split.
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    /// The order was cancelled before or after payment.
    Cancelled,
    /// The goods were returned and the order refunded.
    Returned,
}

text_enum!(OrderStatus, "order status", Pending, {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Returned => "returned",
});

impl OrderStatus {
    /// Orders in these states must never have money paid out against them.
    pub fn is_annulled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned)
    }
}

//--------------------------------------    PaymentStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

text_enum!(PaymentStatus, "payment status", Pending, {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

//--------------------------------------       OrderItem       ---------------------------------------------------------
/// A line item on an order, carrying the cost breakdown the split calculator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub quantity: i64,
    /// The price the customer paid per unit
    pub unit_price: Money,
    /// The price the supplier charges the reseller per unit
    pub supplier_price: Money,
}

impl OrderItem {
    pub fn new<S: Into<String>>(sku: S, quantity: i64, unit_price: Money, supplier_price: Money) -> Self {
        Self { sku: sku.into(), quantity, unit_price, supplier_price }
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
/// An order, as seen by the split engine. Orders are owned by the order subsystem and are read-only here.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub store_id: String,
    pub supplier_id: String,
    pub reseller_id: String,
    pub total_amount: Money,
    pub payment_method: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[sqlx(json)]
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A split may only be created for orders that have been paid for and have not been annulled.
    pub fn is_split_eligible(&self) -> bool {
        self.payment_status == PaymentStatus::Paid && !self.status.is_annulled()
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub store_id: String,
    pub supplier_id: String,
    pub reseller_id: String,
    pub total_amount: Money,
    pub payment_method: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_id: OrderId, store_id: S, supplier_id: S, reseller_id: S, total: Money) -> Self {
        Self {
            order_id,
            store_id: store_id.into(),
            supplier_id: supplier_id.into(),
            reseller_id: reseller_id.into(),
            total_amount: total,
            payment_method: "card".to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: OrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = method.into();
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = status;
        self
    }

    /// Shorthand for an order that has been confirmed and paid for.
    pub fn confirmed(self) -> Self {
        self.with_status(OrderStatus::Confirmed).with_payment_status(PaymentStatus::Paid)
    }
}

//--------------------------------------      OrderUpdate      ---------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderUpdate {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment_status.is_none()
    }
}

//--------------------------------------      SplitStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SplitStatus {
    /// Only ever observed inside the creating transaction.
    Pending,
    /// The amounts are frozen.
    Locked,
    /// Every ledger entry has been paid out, or the split has been reversed.
    Settled,
}

text_enum!(SplitStatus, "split status", Locked, {
    Pending => "pending",
    Locked => "locked",
    Settled => "settled",
});

impl SplitStatus {
    /// The split lifecycle is strictly `pending -> locked -> settled`.
    pub fn can_transition_to(&self, next: SplitStatus) -> bool {
        matches!((self, next), (Self::Pending, Self::Locked) | (Self::Locked, Self::Settled))
    }

    pub fn is_frozen(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

//--------------------------------------    AllocationMode     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// The remainder after commission was divided in proportion to the supplier cost and reseller margin of the items.
    ItemMargin,
    /// The order carried no cost data, so the whole remainder went to the supplier.
    SupplierOnly,
}

//--------------------------------------     PolicySource      ---------------------------------------------------------
/// Where the commission and settlement delay applied to a split came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PolicySource {
    Default,
    Tier { tier: String },
    DefaultAfterFailure { reason: String },
}

impl PolicySource {
    pub fn tier_override_applied(&self) -> bool {
        matches!(self, Self::Tier { .. })
    }
}

//--------------------------------------     SplitMetadata     ---------------------------------------------------------
/// Records the policy that was actually applied when the split was calculated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMetadata {
    pub commission_percent: f64,
    pub settlement_delay_days: i64,
    pub nominal_platform_fee: Money,
    pub rounding_residual: Money,
    pub allocation: AllocationMode,
    pub policy: PolicySource,
}

//--------------------------------------     PaymentSplit      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub id: i64,
    pub store_id: String,
    pub order_id: OrderId,
    pub payment_id: Option<String>,
    pub total_amount: Money,
    pub supplier_id: String,
    pub supplier_amount: Money,
    pub reseller_id: String,
    pub reseller_amount: Money,
    pub platform_amount: Money,
    pub status: SplitStatus,
    pub payment_method: String,
    #[sqlx(json)]
    pub metadata: SplitMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSplit {
    pub fn amount_for(&self, entity: EntityType) -> Money {
        match entity {
            EntityType::Supplier => self.supplier_amount,
            EntityType::Reseller => self.reseller_amount,
            EntityType::Platform => self.platform_amount,
        }
    }

    pub fn entity_id_for(&self, entity: EntityType) -> &str {
        match entity {
            EntityType::Supplier => &self.supplier_id,
            EntityType::Reseller => &self.reseller_id,
            EntityType::Platform => PLATFORM_ENTITY_ID,
        }
    }
}

//--------------------------------------    NewPaymentSplit    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentSplit {
    pub store_id: String,
    pub order_id: OrderId,
    pub payment_id: Option<String>,
    pub total_amount: Money,
    pub supplier_id: String,
    pub supplier_amount: Money,
    pub reseller_id: String,
    pub reseller_amount: Money,
    pub platform_amount: Money,
    pub payment_method: String,
    pub metadata: SplitMetadata,
}

//--------------------------------------      SplitUpdate      ---------------------------------------------------------
/// An administrative change to a split. Only the status may change once a split has been locked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitUpdate {
    pub total_amount: Option<Money>,
    pub supplier_amount: Option<Money>,
    pub reseller_amount: Option<Money>,
    pub platform_amount: Option<Money>,
    pub payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub status: Option<SplitStatus>,
}

impl SplitUpdate {
    pub fn with_total_amount(mut self, amount: Money) -> Self {
        self.total_amount = Some(amount);
        self
    }

    pub fn with_supplier_amount(mut self, amount: Money) -> Self {
        self.supplier_amount = Some(amount);
        self
    }

    pub fn with_reseller_amount(mut self, amount: Money) -> Self {
        self.reseller_amount = Some(amount);
        self
    }

    pub fn with_platform_amount(mut self, amount: Money) -> Self {
        self.platform_amount = Some(amount);
        self
    }

    pub fn with_payment_id<S: Into<String>>(mut self, payment_id: S) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_status(mut self, status: SplitStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True if the update touches anything other than the status.
    pub fn changes_frozen_fields(&self) -> bool {
        self.total_amount.is_some() ||
            self.supplier_amount.is_some() ||
            self.reseller_amount.is_some() ||
            self.platform_amount.is_some() ||
            self.payment_id.is_some() ||
            self.payment_method.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.changes_frozen_fields() && self.status.is_none()
    }
}

//--------------------------------------      EntityType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Supplier,
    Reseller,
    Platform,
}

text_enum!(EntityType, "entity type", Platform, {
    Supplier => "supplier",
    Reseller => "reseller",
    Platform => "platform",
});

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Supplier, EntityType::Reseller, EntityType::Platform];
}

//--------------------------------------     LedgerStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// Owed, but still inside the settlement delay (or not yet promoted).
    Pending,
    /// May be paid out.
    Eligible,
    /// The payout was executed.
    Paid,
}

text_enum!(LedgerStatus, "ledger status", Pending, {
    Pending => "pending",
    Eligible => "eligible",
    Paid => "paid",
});

//--------------------------------------       EntryKind       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// One of the three entries created when the split is locked.
    Forward,
    /// A negative entry undoing a forward entry after a refund or cancellation.
    Reversal,
}

text_enum!(EntryKind, "entry kind", Forward, {
    Forward => "forward",
    Reversal => "reversal",
});

//--------------------------------------      LedgerEntry      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub store_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub order_id: OrderId,
    pub payment_split_id: Option<i64>,
    /// Signed. Reversals are negative.
    pub amount: Money,
    pub kind: EntryKind,
    pub status: LedgerStatus,
    pub available_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payout_reference: Option<String>,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now
    }

    /// An entry may be paid out once its settlement delay has elapsed, as long as it hasn't been paid already.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status != LedgerStatus::Paid && self.is_available_at(now)
    }

    /// The status to report for this entry at the given time. Entries that are past their `available_at` count as
    /// eligible even if they have not been promoted yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> LedgerStatus {
        match self.status {
            LedgerStatus::Pending if self.is_available_at(now) => LedgerStatus::Eligible,
            s => s,
        }
    }
}

//--------------------------------------     NewLedgerEntry    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub store_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub order_id: OrderId,
    pub payment_split_id: Option<i64>,
    pub amount: Money,
    pub kind: EntryKind,
    pub available_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl NewLedgerEntry {
    /// The three positive entries owed to the supplier, reseller and platform for a freshly locked split.
    pub fn forward_entries(split: &PaymentSplit, available_at: DateTime<Utc>) -> Vec<NewLedgerEntry> {
        EntityType::ALL
            .iter()
            .map(|&entity| NewLedgerEntry {
                store_id: split.store_id.clone(),
                entity_type: entity,
                entity_id: split.entity_id_for(entity).to_string(),
                order_id: split.order_id.clone(),
                payment_split_id: Some(split.id),
                amount: split.amount_for(entity),
                kind: EntryKind::Forward,
                available_at,
                metadata: serde_json::json!({
                    "commission_percent": split.metadata.commission_percent,
                    "settlement_delay_days": split.metadata.settlement_delay_days,
                }),
            })
            .collect()
    }

    /// Negative entries mirroring the given forward entries. Reversals are available immediately.
    pub fn reversal_entries(forward: &[LedgerEntry], reason: &str, now: DateTime<Utc>) -> Vec<NewLedgerEntry> {
        forward
            .iter()
            .filter(|e| e.kind == EntryKind::Forward)
            .map(|e| NewLedgerEntry {
                store_id: e.store_id.clone(),
                entity_type: e.entity_type,
                entity_id: e.entity_id.clone(),
                order_id: e.order_id.clone(),
                payment_split_id: e.payment_split_id,
                amount: -e.amount,
                kind: EntryKind::Reversal,
                available_at: now,
                metadata: serde_json::json!({ "reason": reason, "reverses_entry": e.id }),
            })
            .collect()
    }
}

//--------------------------------------     LedgerSummary     ---------------------------------------------------------
/// Signed totals per status for one payee. Reversals reduce the totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub pending: Money,
    pub eligible: Money,
    pub paid: Money,
    pub net_total: Money,
    pub entry_count: i64,
}

impl LedgerSummary {
    pub fn empty<S: Into<String>>(entity_type: EntityType, entity_id: S) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            pending: Money::ZERO,
            eligible: Money::ZERO,
            paid: Money::ZERO,
            net_total: Money::ZERO,
            entry_count: 0,
        }
    }

    pub fn add_entry(&mut self, entry: &LedgerEntry, now: DateTime<Utc>) {
        match entry.effective_status(now) {
            LedgerStatus::Pending => self.pending = self.pending + entry.amount,
            LedgerStatus::Eligible => self.eligible = self.eligible + entry.amount,
            LedgerStatus::Paid => self.paid = self.paid + entry.amount,
        }
        self.net_total = self.net_total + entry.amount;
        self.entry_count += 1;
    }
}

//--------------------------------------       TierPolicy      ---------------------------------------------------------
/// A commission tier. Either value may be absent, in which case the default applies.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TierPolicy {
    pub id: i64,
    pub name: String,
    pub commission_percent: Option<f64>,
    pub settlement_delay_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTier {
    pub name: String,
    pub commission_percent: Option<f64>,
    pub settlement_delay_days: Option<i64>,
}

impl NewTier {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), commission_percent: None, settlement_delay_days: None }
    }

    pub fn with_commission_percent(mut self, percent: f64) -> Self {
        self.commission_percent = Some(percent);
        self
    }

    pub fn with_settlement_delay_days(mut self, days: i64) -> Self {
        self.settlement_delay_days = Some(days);
        self
    }
}

//--------------------------------------       AuditEntry      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub action: String,
    pub actor: String,
    #[sqlx(json)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub order_id: OrderId,
    pub action: String,
    pub actor: String,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new<S: Into<String>>(order_id: OrderId, action: S, details: serde_json::Value) -> Self {
        Self { order_id, action: action.into(), actor: "split_ledger_engine".to_string(), details }
    }

    pub fn with_actor<S: Into<String>>(mut self, actor: S) -> Self {
        self.actor = actor.into();
        self
    }
}
