use std::time::Duration;

use cucumber::World;
use log::*;
use sle_common::Money;
use split_ledger_engine::{
    db_types::{EntityType, EntryKind, LedgerEntry, OrderId},
    events::EventProducers,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    PayoutApi,
    PolicyDefaults,
    PolicyResolver,
    RetryPolicy,
    SplitFlowApi,
    SplitLedgerDatabase,
    SplitLedgerError,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct SplitLedgerWorld {
    pub system: Option<SplitLedgerSystem>,
    /// The error returned by the last step that was allowed to fail
    pub last_error: Option<SplitLedgerError>,
}

#[derive(Debug)]
pub struct SplitLedgerSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub flow: SplitFlowApi<SqliteDatabase, SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase>,
}

impl SplitLedgerWorld {
    pub fn system(&self) -> &SplitLedgerSystem {
        self.system.as_ref().expect("Split ledger not initialised")
    }

    pub fn flow(&self) -> &SplitFlowApi<SqliteDatabase, SqliteDatabase> {
        &self.system().flow
    }

    pub fn payouts(&self) -> &PayoutApi<SqliteDatabase> {
        &self.system().payouts
    }

    pub fn db(&self) -> &SqliteDatabase {
        &self.system().db
    }

    /// The forward entry for the payee on the given order
    pub async fn entry_for(&self, entity: EntityType, order_id: &str) -> LedgerEntry {
        let oid = OrderId::from(order_id);
        let entries = self.db().fetch_ledger_for_order(&oid).await.expect("Error fetching ledger");
        entries
            .into_iter()
            .find(|e| e.entity_type == entity && e.kind == EntryKind::Forward)
            .unwrap_or_else(|| panic!("No {entity} entry for order {order_id}"))
    }
}

impl SplitLedgerSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let retry = RetryPolicy::new(10, Duration::from_secs(5)).with_backoff(Duration::from_millis(5));
        let policy = PolicyResolver::new(db.clone(), PolicyDefaults::default(), Duration::from_millis(500));
        let flow = SplitFlowApi::new(db.clone(), policy, EventProducers::default()).with_retry_policy(retry);
        let payouts = PayoutApi::new(db.clone(), EventProducers::default()).with_retry_policy(retry);
        Self { db_path: url, db, flow, payouts }
    }
}

impl SplitLedgerSystem {
    /// Every order written during the scenario, oldest first
    pub async fn order_ids(&self) -> Vec<OrderId> {
        match sqlx::query_scalar::<_, String>("SELECT order_id FROM orders ORDER BY id").fetch_all(self.db.pool()).await {
            Ok(ids) => ids.into_iter().map(OrderId::from).collect(),
            Err(e) => {
                error!("🚀️ Could not list the scenario's orders: {e}");
                Vec::new()
            },
        }
    }

    /// Logs the split and every ledger entry for each order in the scenario
    pub async fn dump_ledger(&self) {
        for order_id in self.order_ids().await {
            match self.db.fetch_split_and_ledger(&order_id).await {
                Ok(Some((split, entries))) => {
                    error!(
                        "🚀️ Order {order_id}: split {} is {}. Total {}, supplier {}, reseller {}, platform {} ({:?})",
                        split.id,
                        split.status,
                        split.total_amount,
                        split.supplier_amount,
                        split.reseller_amount,
                        split.platform_amount,
                        split.metadata.policy
                    );
                    for e in entries {
                        error!(
                            "🚀️     entry {}: {} {} {} {} is {}, available {}, paid {:?} ref {:?}",
                            e.id,
                            e.kind,
                            e.entity_type,
                            e.entity_id,
                            e.amount,
                            e.status,
                            e.available_at,
                            e.paid_at,
                            e.payout_reference
                        );
                    }
                },
                Ok(None) => error!("🚀️ Order {order_id} has no split"),
                Err(e) => error!("🚀️ Could not read the split for order {order_id}: {e}"),
            }
        }
    }

    /// Money that the ledger cannot account for. Forward entries must add up to the split total, and reversals must
    /// either be absent or cancel the forward entries exactly.
    pub async fn ledger_discrepancies(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for order_id in self.order_ids().await {
            let (split, entries) = match self.db.fetch_split_and_ledger(&order_id).await {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(e) => {
                    problems.push(format!("order {order_id}: {e}"));
                    continue;
                },
            };
            let forward = entries.iter().filter(|e| e.kind == EntryKind::Forward).map(|e| e.amount).sum::<Money>();
            let reversed = entries.iter().filter(|e| e.kind == EntryKind::Reversal).map(|e| e.amount).sum::<Money>();
            if forward != split.total_amount {
                problems.push(format!("order {order_id}: forward entries total {forward}, split total {}", split.total_amount));
            }
            if reversed != Money::default() && reversed != -forward {
                problems.push(format!("order {order_id}: reversals total {reversed} against {forward} forward"));
            }
        }
        problems
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
