use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use chrono::Utc;
use sle_common::Money;
use split_ledger_engine::{
    db_types::{
        AllocationMode,
        EntityType,
        EntryKind,
        LedgerStatus,
        NewTier,
        OrderId,
        PolicySource,
        SplitStatus,
        SplitUpdate,
    },
    events::{EventHandlers, EventHooks, EventProducers, EventType, SplitCreatedEvent},
    helpers::ValidationError,
    AuditLog,
    NoTierSystem,
    ReversalOutcome,
    SplitFlowApi,
    SplitLedgerConfig,
    SplitLedgerDatabase,
    SplitLedgerError,
    SqliteDatabase,
};

mod support;

use support::*;

#[tokio::test]
async fn forward_path_locks_a_reconciled_split() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1001")).await;
    let before = Utc::now();

    let outcome = api.on_order_confirmed(&order, Some("pi_1001".into()), None).await.expect("Forward path failed");
    assert!(!outcome.already_processed);
    let split = &outcome.split;
    assert_eq!(split.status, SplitStatus::Locked);
    assert_eq!(split.total_amount, Money::from_units(1000));
    assert_eq!(split.platform_amount, Money::from_units(50));
    assert_eq!(split.supplier_amount, Money::from_units(570));
    assert_eq!(split.reseller_amount, Money::from_units(380));
    assert_eq!(split.supplier_amount + split.reseller_amount, Money::from_units(950));
    assert_eq!(split.payment_id.as_deref(), Some("pi_1001"));
    assert_eq!(split.payment_method, "card");
    assert_eq!(split.metadata.commission_percent, 5.0);
    assert_eq!(split.metadata.settlement_delay_days, 7);
    assert_eq!(split.metadata.allocation, AllocationMode::ItemMargin);
    assert_eq!(split.metadata.policy, PolicySource::Default);

    assert_eq!(outcome.entries.len(), 3);
    for entry in &outcome.entries {
        assert_eq!(entry.kind, EntryKind::Forward);
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(entry.payment_split_id, Some(split.id));
        assert_eq!(entry.amount, split.amount_for(entry.entity_type));
        let delay = entry.available_at - before;
        assert!(delay >= chrono::Duration::days(7));
        assert!(delay < chrono::Duration::days(7) + chrono::Duration::minutes(1));
    }
    let platform = outcome.entries.iter().find(|e| e.entity_type == EntityType::Platform).unwrap();
    assert_eq!(platform.entity_id, "platform");
    tear_down(db).await;
}

#[tokio::test]
async fn repeated_confirmation_returns_the_existing_split() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1002")).await;

    let first = api.on_order_confirmed(&order, None, None).await.expect("Forward path failed");
    let second = api.on_order_confirmed(&order, None, Some("upi".into())).await.expect("Retry failed");
    assert!(!first.already_processed);
    assert!(second.already_processed);
    assert_eq!(first.split, second.split);
    assert_eq!(second.split.payment_method, "card");
    let entries = db.fetch_ledger_for_order(&order.order_id).await.unwrap();
    assert_eq!(entries.len(), 3);
    tear_down(db).await;
}

#[tokio::test]
async fn concurrent_confirmations_create_exactly_one_split() {
    let db = new_db().await;
    let api_a = flow_api(&db, EventProducers::default());
    let api_b = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1003")).await;

    let (a, b, c) = tokio::join!(
        api_a.on_order_confirmed(&order, Some("pi_a".into()), None),
        api_b.on_order_confirmed(&order, Some("pi_b".into()), None),
        api_a.on_order_confirmed(&order, Some("pi_c".into()), None),
    );
    let outcomes = [a.expect("a failed"), b.expect("b failed"), c.expect("c failed")];
    let created = outcomes.iter().filter(|o| !o.already_processed).count();
    assert_eq!(created, 1, "Exactly one call should observe itself as the creator");
    let id = outcomes[0].split.id;
    assert!(outcomes.iter().all(|o| o.split.id == id));

    let splits = sqlx::query_scalar::<_, i64>("SELECT id FROM payment_splits WHERE order_id = '1003'")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(splits, vec![id]);
    let entries = db.fetch_ledger_for_order(&order.order_id).await.unwrap();
    assert_eq!(entries.len(), 3);
    tear_down(db).await;
}

#[tokio::test]
async fn ineligible_orders_are_rejected_and_nothing_is_written() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let unpaid = sample_order("1004").with_payment_status(split_ledger_engine::db_types::PaymentStatus::Pending);
    let order = insert_order(&db, unpaid).await;

    let err = api.on_order_confirmed(&order, None, None).await.unwrap_err();
    assert!(matches!(err, SplitLedgerError::Validation(ValidationError::OrderNotEligible { .. })));
    assert!(!err.is_retryable());
    assert!(err.needs_investigation());
    assert!(db.fetch_split_for_order(&order.order_id).await.unwrap().is_none());
    assert!(db.fetch_ledger_for_order(&order.order_id).await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn reversal_appends_mirrored_negative_entries() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1005")).await;
    let created = api.on_order_confirmed(&order, None, None).await.unwrap();

    let outcome = api.on_order_reversed(&order.order_id, "customer refund").await.expect("Reversal failed");
    let after = Utc::now();
    assert!(!outcome.already_processed());
    let split = outcome.split().expect("Split should be returned");
    assert_eq!(split.status, SplitStatus::Settled);
    let reversals = outcome.entries();
    assert_eq!(reversals.len(), 3);
    for r in reversals {
        assert_eq!(r.kind, EntryKind::Reversal);
        assert!(r.available_at <= after);
        let forward = created.entries.iter().find(|e| e.entity_type == r.entity_type).unwrap();
        assert_eq!(r.amount, -forward.amount);
        assert_eq!(r.payment_split_id, forward.payment_split_id);
    }
    let platform = reversals.iter().find(|e| e.entity_type == EntityType::Platform).unwrap();
    assert_eq!(platform.amount, Money::from_units(-50));

    // The originals are untouched
    let all = db.fetch_ledger_for_order(&order.order_id).await.unwrap();
    assert_eq!(all.len(), 6);
    for forward in &created.entries {
        let stored = all.iter().find(|e| e.id == forward.id).unwrap();
        assert_eq!(stored.amount, forward.amount);
    }
    tear_down(db).await;
}

#[tokio::test]
async fn repeated_reversal_writes_nothing() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1006")).await;
    api.on_order_confirmed(&order, None, None).await.unwrap();

    let first = api.on_order_reversed(&order.order_id, "cancelled").await.unwrap();
    let (second, third) = tokio::join!(
        api.on_order_reversed(&order.order_id, "cancelled again"),
        api.on_order_reversed(&order.order_id, "webhook retry"),
    );
    assert!(!first.already_processed());
    assert!(second.unwrap().already_processed());
    let third = third.unwrap();
    assert!(third.already_processed());
    assert_eq!(third.entries(), first.entries());
    let reversals = db
        .fetch_ledger_for_order(&order.order_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == EntryKind::Reversal)
        .count();
    assert_eq!(reversals, 3);
    tear_down(db).await;
}

#[tokio::test]
async fn reversing_an_order_without_a_split_is_not_an_error() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let outcome = api.on_order_reversed(&OrderId::from("never-paid"), "cancelled before payment").await.unwrap();
    assert_eq!(outcome, ReversalOutcome::NothingToReverse);
    tear_down(db).await;
}

#[tokio::test]
async fn locked_splits_cannot_be_edited() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1007")).await;
    let created = api.on_order_confirmed(&order, None, None).await.unwrap();

    let update = SplitUpdate::default()
        .with_supplier_amount(Money::from_units(600))
        .with_reseller_amount(Money::from_units(350));
    let err = api.update_split(&order.order_id, update).await.unwrap_err();
    assert!(matches!(err, SplitLedgerError::Validation(ValidationError::ImmutableSplit(_, SplitStatus::Locked))));

    let unlock = SplitUpdate::default().with_status(SplitStatus::Pending);
    let err = api.update_split(&order.order_id, unlock).await.unwrap_err();
    assert!(matches!(err, SplitLedgerError::Validation(ValidationError::IllegalTransition { .. })));

    let stored = db.fetch_split_for_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored, created.split);

    let settled = api.update_split(&order.order_id, SplitUpdate::default().with_status(SplitStatus::Settled)).await;
    assert_eq!(settled.unwrap().status, SplitStatus::Settled);

    let err = api.update_split(&OrderId::from("missing"), SplitUpdate::default()).await.unwrap_err();
    assert!(matches!(err, SplitLedgerError::SplitNotFound(_)));
    tear_down(db).await;
}

#[tokio::test]
async fn tier_overrides_are_recorded_in_the_metadata() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    db.upsert_tier(NewTier::new("gold").with_commission_percent(10.0).with_settlement_delay_days(3)).await.unwrap();
    assert!(db.assign_supplier_tier("sup-1", "gold").await.unwrap());
    assert!(!db.assign_supplier_tier("sup-1", "no-such-tier").await.unwrap());
    let order = insert_order(&db, sample_order("1008")).await;

    let outcome = api.on_order_confirmed(&order, None, None).await.unwrap();
    let split = outcome.split;
    assert_eq!(split.platform_amount, Money::from_units(100));
    assert_eq!(split.supplier_amount, Money::from_units(540));
    assert_eq!(split.reseller_amount, Money::from_units(360));
    assert_eq!(split.metadata.policy, PolicySource::Tier { tier: "gold".into() });
    assert_eq!(split.metadata.settlement_delay_days, 3);
    tear_down(db).await;
}

#[tokio::test]
async fn an_unusable_tier_falls_back_to_the_defaults() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    db.upsert_tier(NewTier::new("broken").with_commission_percent(150.0)).await.unwrap();
    assert!(db.assign_supplier_tier("sup-1", "broken").await.unwrap());
    let order = insert_order(&db, sample_order("1009")).await;

    let outcome = api.on_order_confirmed(&order, None, None).await.expect("Policy failures must not block splits");
    let meta = outcome.split.metadata;
    assert_eq!(meta.commission_percent, 5.0);
    assert_eq!(meta.settlement_delay_days, 7);
    assert!(matches!(meta.policy, PolicySource::DefaultAfterFailure { .. }));
    assert!(!meta.policy.tier_override_applied());
    tear_down(db).await;
}

#[tokio::test]
async fn a_tier_with_an_absurd_delay_falls_back_to_the_defaults() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    db.upsert_tier(NewTier::new("forever").with_settlement_delay_days(1_000_000_000)).await.unwrap();
    assert!(db.assign_supplier_tier("sup-1", "forever").await.unwrap());
    let order = insert_order(&db, sample_order("1030")).await;
    let before = Utc::now();

    let outcome = api.on_order_confirmed(&order, None, None).await.expect("Huge delays must not block splits");
    let meta = outcome.split.metadata;
    assert_eq!(meta.settlement_delay_days, 7);
    assert!(matches!(meta.policy, PolicySource::DefaultAfterFailure { .. }));
    assert!(outcome.entries.iter().all(|e| e.available_at < before + chrono::Duration::days(8)));
    tear_down(db).await;
}

#[tokio::test]
async fn an_out_of_range_default_delay_is_rejected_without_writing() {
    let db = new_db().await;
    let mut config = SplitLedgerConfig::new(db.url());
    config.default_settlement_delay_days = i64::MAX;
    let api = SplitFlowApi::from_config(db.clone(), NoTierSystem, EventProducers::default(), &config);
    let order = insert_order(&db, sample_order("1031")).await;

    let err = api.on_order_confirmed(&order, None, None).await.expect_err("The delay cannot be represented");
    assert!(matches!(err, SplitLedgerError::Validation(ValidationError::SettlementDelayOutOfRange(i64::MAX))));
    assert!(db.fetch_split_for_order(&order.order_id).await.unwrap().is_none());
    assert!(db.fetch_ledger_for_order(&order.order_id).await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn orders_without_cost_data_pay_the_remainder_to_the_supplier() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let bare = split_ledger_engine::db_types::NewOrder::new(
        OrderId::from("1010"),
        "store-1",
        "sup-2",
        "res-2",
        Money::from_cents(12_345),
    )
    .confirmed();
    let order = insert_order(&db, bare).await;

    let split = api.on_order_confirmed(&order, None, None).await.unwrap().split;
    assert_eq!(split.platform_amount, Money::from_cents(617));
    assert_eq!(split.supplier_amount, Money::from_cents(11_728));
    assert_eq!(split.reseller_amount, Money::ZERO);
    assert_eq!(split.metadata.allocation, AllocationMode::SupplierOnly);
    tear_down(db).await;
}

#[tokio::test]
async fn audit_records_follow_committed_changes() {
    let db = new_db().await;
    let api = flow_api(&db, EventProducers::default());
    let order = insert_order(&db, sample_order("1011")).await;
    api.on_order_confirmed(&order, None, None).await.unwrap();
    api.on_order_confirmed(&order, None, None).await.unwrap();
    api.on_order_reversed(&order.order_id, "refund").await.unwrap();
    api.on_order_reversed(&order.order_id, "refund").await.unwrap();

    let actions =
        db.fetch_audit_log(&order.order_id).await.unwrap().into_iter().map(|a| a.action).collect::<Vec<_>>();
    assert_eq!(actions, vec!["split.created".to_string(), "split.reversed".to_string()]);

    let quiet = flow_api(&db, EventProducers::default()).with_audit(false);
    let other = insert_order(&db, sample_order("1012")).await;
    quiet.on_order_confirmed(&other, None, None).await.unwrap();
    assert!(db.fetch_audit_log(&other.order_id).await.unwrap().is_empty());
    tear_down(db).await;
}

async fn wait_for(counter: &AtomicU32, expected: u32) {
    for _ in 0..100 {
        if counter.load(Ordering::SeqCst) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn events_are_published_once_per_committed_change() {
    let db = new_db().await;
    let created = Arc::new(AtomicU32::new(0));
    let names = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut hooks = EventHooks::default();
    let c = created.clone();
    hooks.on_split_created(move |ev: SplitCreatedEvent| {
        let c = c.clone();
        Box::pin(async move {
            assert_eq!(ev.payload()["platform_amount"], 5_000);
            c.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let n = names.clone();
    hooks.on_event(move |ev: EventType| {
        let n = n.clone();
        Box::pin(async move {
            n.lock().unwrap().push(ev.name().to_string());
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = flow_api(&db, producers);
    let order = insert_order(&db, sample_order("1013")).await;

    api.on_order_confirmed(&order, None, None).await.unwrap();
    api.on_order_confirmed(&order, None, None).await.unwrap();
    api.on_order_reversed(&order.order_id, "refund").await.unwrap();
    api.on_order_reversed(&order.order_id, "refund").await.unwrap();
    wait_for(&created, 1).await;
    for _ in 0..100 {
        if names.lock().unwrap().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(created.load(Ordering::SeqCst), 1);
    let mut seen = names.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["payment.split.created".to_string(), "payment.split.reversed".to_string()]);
    tear_down(db).await;
}

#[tokio::test]
async fn failed_validation_publishes_nothing() {
    let db = new_db().await;
    let count = Arc::new(AtomicU32::new(0));
    let mut hooks = EventHooks::default();
    let c = count.clone();
    hooks.on_event(move |_ev: EventType| {
        let c = c.clone();
        Box::pin(async move {
            c.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let api = flow_api(&db, producers);
    let cancelled =
        sample_order("1014").with_status(split_ledger_engine::db_types::OrderStatus::Cancelled);
    let order = insert_order(&db, cancelled).await;

    assert!(api.on_order_confirmed(&order, None, None).await.is_err());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(db.fetch_audit_log(&order.order_id).await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn configured_defaults_drive_the_split() {
    let db = new_db().await;
    let mut config = SplitLedgerConfig::new(db.url());
    config.default_commission_percent = 2.5;
    config.default_settlement_delay_days = 14;
    config.audit_enabled = false;
    let api = SplitFlowApi::from_config(db.clone(), NoTierSystem, EventProducers::default(), &config);
    let order = insert_order(&db, sample_order("1015")).await;
    let before = Utc::now();

    let outcome = api.on_order_confirmed(&order, None, None).await.unwrap();
    assert_eq!(outcome.split.platform_amount, Money::from_units(25));
    assert_eq!(outcome.split.metadata.settlement_delay_days, 14);
    assert_eq!(outcome.split.metadata.policy, PolicySource::Default);
    assert!(outcome.entries.iter().all(|e| e.available_at >= before + chrono::Duration::days(14)));
    assert!(db.fetch_audit_log(&order.order_id).await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn embedded_migrations_can_run_on_every_start() {
    use sqlx::{migrate::MigrateDatabase, Sqlite};
    let url = split_ledger_engine::test_utils::prepare_env::random_db_path();
    Sqlite::create_database(&url).await.unwrap();
    let db = SqliteDatabase::new_with_url(&url, 2).await.unwrap();
    db.run_migrations().await.expect("First migration run failed");
    db.run_migrations().await.expect("Migrations should be skipped once applied");

    let order = insert_order(&db, sample_order("1032")).await;
    let outcome = flow_api(&db, EventProducers::default()).on_order_confirmed(&order, None, None).await.unwrap();
    assert_eq!(outcome.entries.len(), 3);
    tear_down(db).await;
}

#[tokio::test]
async fn splits_complete_when_event_handlers_were_never_started() {
    let db = new_db().await;
    let mut hooks = EventHooks::default();
    hooks.on_split_created(|_| Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>);
    hooks.on_event(|_| Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>);
    let handlers = EventHandlers::new(1, hooks);
    let api = flow_api(&db, handlers.producers());

    let confirmations = async {
        for id in ["1033", "1034", "1035"] {
            let order = insert_order(&db, sample_order(id)).await;
            api.on_order_confirmed(&order, None, None).await.unwrap();
            api.on_order_reversed(&order.order_id, "refund").await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(10), confirmations).await.expect("Publishing blocked the split flow");
    assert!(db.fetch_split_for_order(&OrderId::from("1035")).await.unwrap().is_some());
    drop(handlers);
    tear_down(db).await;
}
