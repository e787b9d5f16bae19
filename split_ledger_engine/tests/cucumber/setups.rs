use cucumber::given;
use split_ledger_engine::db_types::NewTier;

use crate::cucumber::{split_ledger_world::SplitLedgerSystem, SplitLedgerWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut SplitLedgerWorld) {
    let system = SplitLedgerSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "supplier '{word}' is on tier '{word}' with {float}% commission and {int} days settlement delay")]
async fn supplier_on_tier(world: &mut SplitLedgerWorld, supplier: String, tier: String, percent: f64, days: i64) {
    let db = world.db();
    let tier_def = NewTier::new(tier.as_str()).with_commission_percent(percent).with_settlement_delay_days(days);
    db.upsert_tier(tier_def).await.expect("Error saving tier");
    let assigned = db.assign_supplier_tier(&supplier, &tier).await.expect("Error assigning tier");
    assert!(assigned, "Tier {tier} does not exist");
}
