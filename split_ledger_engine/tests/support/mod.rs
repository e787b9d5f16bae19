#![allow(dead_code)]
use std::time::Duration;

use log::*;
use sle_common::Money;
use split_ledger_engine::{
    db_types::{NewOrder, NewTier, Order, OrderId, OrderItem},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    InsertOrderResult,
    OrderManagement,
    PayoutApi,
    PolicyDefaults,
    PolicyResolver,
    RetryPolicy,
    SplitFlowApi,
    SplitLedgerDatabase,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub type FlowApi = SplitFlowApi<SqliteDatabase, SqliteDatabase>;

pub async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("🚀️ Failed to remove test database {url}: {e}");
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(10, Duration::from_secs(5)).with_backoff(Duration::from_millis(5))
}

pub fn flow_api(db: &SqliteDatabase, producers: EventProducers) -> FlowApi {
    let policy = PolicyResolver::new(db.clone(), PolicyDefaults::default(), Duration::from_millis(500));
    SplitFlowApi::new(db.clone(), policy, producers).with_retry_policy(fast_retry())
}

pub fn payout_api(db: &SqliteDatabase, producers: EventProducers) -> PayoutApi<SqliteDatabase> {
    PayoutApi::new(db.clone(), producers).with_retry_policy(fast_retry())
}

/// A confirmed, paid 1000.00 order whose items cost the reseller 600.00
pub fn sample_order(order_id: &str) -> NewOrder {
    NewOrder::new(OrderId::from(order_id), "store-1", "sup-1", "res-1", Money::from_units(1000))
        .with_item(OrderItem::new("sku-1", 2, Money::from_units(500), Money::from_units(300)))
        .confirmed()
}

pub async fn insert_order(db: &SqliteDatabase, order: NewOrder) -> Order {
    match db.insert_order(order).await.expect("Error inserting order") {
        InsertOrderResult::Inserted(o) | InsertOrderResult::AlreadyExists(o) => o,
    }
}

/// Puts `sup-1` on a tier with no settlement delay, so that its entries are payable immediately.
pub async fn use_instant_tier(db: &SqliteDatabase, supplier_id: &str) {
    db.upsert_tier(NewTier::new("instant").with_settlement_delay_days(0)).await.expect("Error saving tier");
    assert!(db.assign_supplier_tier(supplier_id, "instant").await.expect("Error assigning tier"));
}
