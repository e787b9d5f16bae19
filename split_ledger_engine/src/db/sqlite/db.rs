use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{audit, db_url, ledger, new_pool, orders, splits, tiers};
use crate::{
    db::traits::{
        AuditLog,
        InsertOrderResult,
        InsertSplitResult,
        MarkPaidResult,
        OrderManagement,
        PolicyLookupError,
        PolicyProvider,
        ReverseSplitResult,
        SplitLedgerDatabase,
        SplitLedgerError,
    },
    db_types::{
        AuditEntry,
        EntityType,
        EntryKind,
        LedgerEntry,
        LedgerStatus,
        NewAuditEntry,
        NewLedgerEntry,
        NewOrder,
        NewPaymentSplit,
        NewTier,
        Order,
        OrderId,
        OrderUpdate,
        PaymentSplit,
        SplitStatus,
        SplitUpdate,
        TierPolicy,
    },
    helpers::{validate_new_split, validate_split_update},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `SLE_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, SplitLedgerError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SplitLedgerError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Created new SQLite connection pool for {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    /// Returns a reference to the database connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date, using the migrations embedded in the binary. Migrations that have already been
    /// applied are skipped, so this is safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), SplitLedgerError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Schema for {} is up to date", self.url);
        Ok(())
    }

    /// Creates or replaces a commission tier
    pub async fn upsert_tier(&self, tier: NewTier) -> Result<TierPolicy, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        tiers::upsert_tier(tier, &mut conn).await
    }

    /// Assigns the named tier to the supplier. Returns false if no tier with that name exists.
    pub async fn assign_supplier_tier(&self, supplier_id: &str, tier_name: &str) -> Result<bool, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        tiers::assign_supplier_tier(supplier_id, tier_name, &mut conn).await
    }

    pub async fn clear_supplier_tier(&self, supplier_id: &str) -> Result<bool, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        tiers::clear_supplier_tier(supplier_id, &mut conn).await
    }

    /// The read that follows a lost race on `order_id`. By now the winner has committed, so the split must be visible.
    async fn fetch_existing_split(&self, order_id: &OrderId) -> Result<InsertSplitResult, SplitLedgerError> {
        match self.fetch_split_and_ledger(order_id).await? {
            Some((split, entries)) => Ok(InsertSplitResult::AlreadyExists(split, entries)),
            None => Err(SplitLedgerError::TransientStorage(format!(
                "A split for order {order_id} was written concurrently but is not visible yet"
            ))),
        }
    }
}

impl SplitLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_split_for_order(&self, order_id: &OrderId) -> Result<Option<PaymentSplit>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        splits::fetch_split_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_ledger_for_order(&self, order_id: &OrderId) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_entries_for_order(order_id, &mut conn).await
    }

    async fn fetch_split_and_ledger(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(PaymentSplit, Vec<LedgerEntry>)>, SplitLedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = match splits::fetch_split_by_order_id(order_id, &mut tx).await? {
            Some(split) => {
                let entries = ledger::fetch_entries_for_order(order_id, &mut tx).await?;
                Some((split, entries))
            },
            None => None,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_ledger_entry(&self, entry_id: i64) -> Result<Option<LedgerEntry>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_entry(entry_id, &mut conn).await
    }

    async fn insert_locked_split(
        &self,
        split: NewPaymentSplit,
        available_at: DateTime<Utc>,
    ) -> Result<InsertSplitResult, SplitLedgerError> {
        validate_new_split(&split)?;
        let order_id = split.order_id.clone();
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = splits::fetch_split_by_order_id(&order_id, &mut tx).await? {
            let entries = ledger::fetch_entries_for_order(&order_id, &mut tx).await?;
            tx.commit().await?;
            debug!("🗃️ Split for order {order_id} already exists. Nothing was written.");
            return Ok(InsertSplitResult::AlreadyExists(existing, entries));
        }
        let now = Utc::now();
        let pending = match splits::insert_pending_split(split, now, &mut tx).await? {
            Some(s) => s,
            None => {
                tx.rollback().await?;
                debug!("🗃️ Lost the race to create the split for order {order_id}. Re-reading the winner.");
                return self.fetch_existing_split(&order_id).await;
            },
        };
        let locked = splits::update_split_status(pending.id, SplitStatus::Pending, SplitStatus::Locked, now, &mut tx)
            .await?
            .ok_or_else(|| {
                SplitLedgerError::DatabaseError(format!("Split {} vanished before it could be locked", pending.id))
            })?;
        let entries = ledger::insert_entries(NewLedgerEntry::forward_entries(&locked, available_at), now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Split {} for order {order_id} locked with {} ledger entries", locked.id, entries.len());
        Ok(InsertSplitResult::Inserted(locked, entries))
    }

    async fn reverse_split(
        &self,
        order_id: &OrderId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ReverseSplitResult, SplitLedgerError> {
        let mut tx = self.pool.begin().await?;
        let Some(split) = splits::fetch_split_by_order_id(order_id, &mut tx).await? else {
            tx.commit().await?;
            debug!("🗃️ Order {order_id} has no split. Nothing to reverse.");
            return Ok(ReverseSplitResult::NothingToReverse);
        };
        let entries = ledger::fetch_entries_for_order(order_id, &mut tx).await?;
        if entries.iter().any(|e| e.kind == EntryKind::Reversal) {
            tx.commit().await?;
            debug!("🗃️ Order {order_id} has already been reversed. Nothing was written.");
            return Ok(ReverseSplitResult::AlreadyReversed { split, entries });
        }
        let reversals = NewLedgerEntry::reversal_entries(&entries, reason, now);
        let reversals = ledger::insert_entries(reversals, now, &mut tx).await?;
        let split = match split.status {
            SplitStatus::Locked => {
                splits::update_split_status(split.id, SplitStatus::Locked, SplitStatus::Settled, now, &mut tx)
                    .await?
                    .ok_or_else(|| {
                        SplitLedgerError::DatabaseError(format!("Split {} vanished before it could be settled", split.id))
                    })?
            },
            _ => split,
        };
        tx.commit().await?;
        debug!("🗃️ Order {order_id} reversed with {} entries. Split is {}", reversals.len(), split.status);
        Ok(ReverseSplitResult::Reversed { split, entries: reversals })
    }

    async fn mark_entry_paid(
        &self,
        entry_id: i64,
        payout_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<MarkPaidResult, SplitLedgerError> {
        let mut tx = self.pool.begin().await?;
        let entry = ledger::fetch_entry(entry_id, &mut tx).await?.ok_or(SplitLedgerError::EntryNotFound(entry_id))?;
        if entry.status == LedgerStatus::Paid {
            return Err(SplitLedgerError::AlreadyPaid(entry_id));
        }
        if !entry.is_available_at(now) {
            return Err(SplitLedgerError::NotEligible { entry_id, available_at: entry.available_at });
        }
        if entry.status == LedgerStatus::Pending {
            ledger::promote_entry(entry_id, now, &mut tx).await?;
        }
        let entry = ledger::mark_paid(entry_id, payout_reference, now, &mut tx)
            .await?
            .ok_or(SplitLedgerError::AlreadyPaid(entry_id))?;
        let mut settled_split = None;
        if ledger::count_unpaid_for_order(&entry.order_id, &mut tx).await? == 0 {
            if let Some(split) = splits::fetch_split_by_order_id(&entry.order_id, &mut tx).await? {
                if split.status == SplitStatus::Locked {
                    settled_split =
                        splits::update_split_status(split.id, SplitStatus::Locked, SplitStatus::Settled, now, &mut tx)
                            .await?;
                }
            }
        }
        tx.commit().await?;
        debug!("🗃️ Ledger entry {entry_id} paid with reference {payout_reference}");
        Ok(MarkPaidResult { entry, settled_split })
    }

    async fn update_split(&self, order_id: &OrderId, update: SplitUpdate) -> Result<PaymentSplit, SplitLedgerError> {
        let mut tx = self.pool.begin().await?;
        let split = splits::fetch_split_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| SplitLedgerError::SplitNotFound(order_id.clone()))?;
        if let Err(e) = validate_split_update(&split, &update) {
            warn!("🗃️ Rejected update to the split for order {order_id}. {e}");
            return Err(e.into());
        }
        if update.is_empty() {
            tx.commit().await?;
            return Ok(split);
        }
        let updated = splits::apply_split_update(split.id, update, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Split for order {order_id} updated by an administrator. Status is now {}", updated.status);
        Ok(updated)
    }

    async fn fetch_eligible_entries(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_eligible_entries(entity_type, entity_id, now, &mut conn).await
    }

    async fn fetch_entries_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_entries_for_entity(entity_type, entity_id, &mut conn).await
    }

    async fn promote_eligible_entries(&self, now: DateTime<Utc>) -> Result<u64, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        ledger::promote_all_entries(now, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), SplitLedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, SplitLedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn update_order(&self, order_id: &OrderId, update: OrderUpdate) -> Result<Order, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order(order_id, update, &mut conn)
            .await?
            .ok_or_else(|| SplitLedgerError::OrderNotFound(order_id.clone()))
    }
}

impl PolicyProvider for SqliteDatabase {
    async fn fetch_tier_for_supplier(&self, supplier_id: &str) -> Result<Option<TierPolicy>, PolicyLookupError> {
        let mut conn = self.pool.acquire().await?;
        tiers::fetch_tier_for_supplier(supplier_id, &mut conn).await.map_err(|e| PolicyLookupError(e.to_string()))
    }
}

impl AuditLog for SqliteDatabase {
    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let id = audit::insert_audit_entry(entry, &mut conn).await?;
        trace!("🗃️ Audit record {id} written");
        Ok(())
    }

    async fn fetch_audit_log(&self, order_id: &OrderId) -> Result<Vec<AuditEntry>, SplitLedgerError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_audit_log(order_id, &mut conn).await
    }
}

