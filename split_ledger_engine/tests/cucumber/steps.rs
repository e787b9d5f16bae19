use std::{str::FromStr, time::Duration};

use chrono::Utc;
use cucumber::{then, when};
use sle_common::Money;
use split_ledger_engine::{
    db_types::{EntityType, EntryKind, LedgerStatus, NewOrder, OrderId, OrderItem, SplitStatus},
    InsertOrderResult,
    OrderManagement,
    SplitLedgerDatabase,
    SplitLedgerError,
};

use crate::cucumber::SplitLedgerWorld;

fn money(s: &str) -> Money {
    Money::from_str(s).unwrap_or_else(|e| panic!("{s} is not a valid amount. {e}"))
}

fn entity(s: &str) -> EntityType {
    EntityType::from_str(s).unwrap_or_else(|e| panic!("{e}"))
}

//     When a paid order 1001 for 1000.00 from supplier 'sup-1' and reseller 'res-1' with supplier cost 600.00
#[when(
    expr = "a paid order {word} for {word} from supplier '{word}' and reseller '{word}' with supplier cost {word}"
)]
async fn paid_order(
    world: &mut SplitLedgerWorld,
    order_id: String,
    total: String,
    sup: String,
    res: String,
    cost: String,
) {
    let total = money(&total);
    let order = NewOrder::new(OrderId::from(order_id), "store-1", sup.as_str(), res.as_str(), total)
        .with_item(OrderItem::new("sku-1", 1, total, money(&cost)))
        .confirmed();
    match world.db().insert_order(order).await.expect("Error inserting order") {
        InsertOrderResult::Inserted(_) => {},
        InsertOrderResult::AlreadyExists(o) => panic!("Order {} already exists", o.order_id),
    }
}

#[when(expr = "the payment for order {word} is confirmed")]
async fn payment_confirmed(world: &mut SplitLedgerWorld, order_id: String) {
    let oid = OrderId::from(order_id);
    let order = world.db().fetch_order_by_order_id(&oid).await.expect("Error fetching order").expect("No such order");
    world.flow().on_order_confirmed(&order, Some(format!("pi_{oid}")), None).await.expect("Error creating split");
}

#[when(expr = "order {word} is reversed because {string}")]
async fn order_reversed(world: &mut SplitLedgerWorld, order_id: String, reason: String) {
    let oid = OrderId::from(order_id);
    world.flow().on_order_reversed(&oid, &reason).await.expect("Error reversing split");
}

#[when(expr = "I pay the {word} entry for order {word} with reference '{word}'")]
async fn pay_entry(world: &mut SplitLedgerWorld, payee: String, order_id: String, reference: String) {
    let entry = world.entry_for(entity(&payee), &order_id).await;
    let result = world.payouts().mark_paid(entry.id, &reference).await;
    world.last_error = result.err();
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut SplitLedgerWorld, ms: u64) {
    let delay = Duration::from_millis(ms);
    tokio::time::sleep(delay).await;
}

#[then(expr = "the split for order {word} is {word} with platform {word}, supplier {word} and reseller {word}")]
async fn check_split(
    world: &mut SplitLedgerWorld,
    order_id: String,
    status: String,
    platform: String,
    supplier: String,
    reseller: String,
) {
    let oid = OrderId::from(order_id);
    let split = world.db().fetch_split_for_order(&oid).await.expect("Error fetching split").expect("No split");
    assert_eq!(split.status, SplitStatus::from_str(&status).unwrap(), "Split status is incorrect");
    assert_eq!(split.platform_amount, money(&platform), "Platform amount is incorrect");
    assert_eq!(split.supplier_amount, money(&supplier), "Supplier amount is incorrect");
    assert_eq!(split.reseller_amount, money(&reseller), "Reseller amount is incorrect");
}

#[then(expr = "order {word} has {int} forward and {int} reversal ledger entries")]
async fn check_entry_counts(world: &mut SplitLedgerWorld, order_id: String, forward: usize, reversal: usize) {
    let oid = OrderId::from(order_id);
    let entries = world.db().fetch_ledger_for_order(&oid).await.expect("Error fetching ledger");
    let count = |kind: EntryKind| entries.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(EntryKind::Forward), forward, "Forward entry count is incorrect");
    assert_eq!(count(EntryKind::Reversal), reversal, "Reversal entry count is incorrect");
}

#[then(expr = "the {word} entry for order {word} is {word}")]
async fn check_entry_status(world: &mut SplitLedgerWorld, payee: String, order_id: String, status: String) {
    let entry = world.entry_for(entity(&payee), &order_id).await;
    let expected = LedgerStatus::from_str(&status).unwrap();
    assert_eq!(entry.effective_status(Utc::now()), expected, "Entry status is incorrect");
}

#[then(expr = "the payout fails because the entry is not yet eligible")]
async fn check_not_eligible(world: &mut SplitLedgerWorld) {
    let err = world.last_error.take().expect("The payout succeeded");
    assert!(matches!(err, SplitLedgerError::NotEligible { .. }), "Unexpected error: {err}");
}

#[then(expr = "the payout fails because the entry has already been paid")]
async fn check_already_paid(world: &mut SplitLedgerWorld) {
    let err = world.last_error.take().expect("The payout succeeded");
    assert!(matches!(err, SplitLedgerError::AlreadyPaid(_)), "Unexpected error: {err}");
}

#[then(expr = "the payout succeeds")]
async fn check_paid(world: &mut SplitLedgerWorld) {
    assert!(world.last_error.is_none(), "Payout failed: {:?}", world.last_error);
}

#[then(expr = "the {word} '{word}' has {word} pending, {word} eligible and {word} paid")]
async fn check_summary(
    world: &mut SplitLedgerWorld,
    payee: String,
    id: String,
    pending: String,
    eligible: String,
    paid: String,
) {
    let summary = world.payouts().summarize(entity(&payee), &id).await.expect("Error fetching summary");
    assert_eq!(summary.pending, money(&pending), "Pending total is incorrect");
    assert_eq!(summary.eligible, money(&eligible), "Eligible total is incorrect");
    assert_eq!(summary.paid, money(&paid), "Paid total is incorrect");
}

#[then(expr = "{word} '{word}' has {int} eligible payouts")]
async fn check_eligible_payouts(world: &mut SplitLedgerWorld, payee: String, id: String, count: usize) {
    let entries = world.payouts().get_eligible_payouts(entity(&payee), &id).await.expect("Error fetching payouts");
    assert_eq!(entries.len(), count, "Eligible payout count is incorrect");
}
