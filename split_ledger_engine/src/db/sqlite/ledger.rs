//! Low-level access to the `payout_ledger` table.
//!
//! The table is append-only. Apart from the payout fields (`status`, `paid_at` and `payout_reference`), rows are
//! never changed after they are written, and the triggers in the migration set reject any attempt to do so.
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use super::{is_unique_violation, single_row};
use crate::{
    db::traits::SplitLedgerError,
    db_types::{EntityType, LedgerEntry, LedgerStatus, NewLedgerEntry, OrderId},
};

/// Appends the entries in order. Run this inside a transaction so that the batch is written as a set.
///
/// A uniqueness violation means a concurrent writer already appended the same batch, and is reported as a transient
/// failure so that the caller re-reads.
pub async fn insert_entries(
    entries: Vec<NewLedgerEntry>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        let inserted = sqlx::query_as::<_, LedgerEntry>(
            r#"
                INSERT INTO payout_ledger (
                    store_id,
                    entity_type,
                    entity_id,
                    order_id,
                    payment_split_id,
                    amount,
                    kind,
                    status,
                    available_at,
                    metadata,
                    created_at,
                    updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING *;
            "#,
        )
        .bind(entry.store_id)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.order_id)
        .bind(entry.payment_split_id)
        .bind(entry.amount)
        .bind(entry.kind)
        .bind(LedgerStatus::Pending)
        .bind(entry.available_at)
        .bind(Json(entry.metadata))
        .bind(now)
        .bind(now)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SplitLedgerError::TransientStorage(format!("Concurrent ledger write detected. {e}"))
            } else {
                SplitLedgerError::from(e)
            }
        })
        .and_then(single_row)?;
        trace!(
            "🗃️ Ledger entry {} appended: {} {} owed {} for order {}",
            inserted.id,
            inserted.entity_type,
            inserted.entity_id,
            inserted.amount,
            inserted.order_id
        );
        result.push(inserted);
    }
    Ok(result)
}

pub async fn fetch_entry(id: i64, conn: &mut SqliteConnection) -> Result<Option<LedgerEntry>, SplitLedgerError> {
    let entry = sqlx::query_as::<_, LedgerEntry>("SELECT * FROM payout_ledger WHERE id = $1")
        .bind(id)
        .fetch_all(conn)
        .await?
        .into_iter()
        .next();
    Ok(entry)
}

pub async fn fetch_entries_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
    let entries = sqlx::query_as::<_, LedgerEntry>("SELECT * FROM payout_ledger WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

pub async fn fetch_entries_for_entity(
    entity_type: EntityType,
    entity_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
    let entries = sqlx::query_as::<_, LedgerEntry>(
        "SELECT * FROM payout_ledger WHERE entity_type = $1 AND entity_id = $2 ORDER BY id ASC",
    )
    .bind(entity_type)
    .bind(entity_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Unpaid entries for the payee that are past their `available_at`.
///
/// The join on `orders` drops entries whose order has since been cancelled or returned. Entries for orders the
/// backend has no record of are kept.
pub async fn fetch_eligible_entries(
    entity_type: EntityType,
    entity_id: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, SplitLedgerError> {
    let entries = sqlx::query_as::<_, LedgerEntry>(
        r#"
            SELECT payout_ledger.*
            FROM payout_ledger
            LEFT JOIN orders ON orders.order_id = payout_ledger.order_id
            WHERE payout_ledger.entity_type = $1
              AND payout_ledger.entity_id = $2
              AND payout_ledger.status IN ('pending', 'eligible')
              AND payout_ledger.available_at <= $3
              AND (orders.status IS NULL OR orders.status NOT IN ('cancelled', 'returned'))
            ORDER BY payout_ledger.available_at ASC, payout_ledger.id ASC
        "#,
    )
    .bind(entity_type)
    .bind(entity_id)
    .bind(now)
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} eligible entries for {entity_type} {entity_id}", entries.len());
    Ok(entries)
}

/// Moves a single entry from `pending` to `eligible`, if its `available_at` has passed.
pub async fn promote_entry(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, SplitLedgerError> {
    let result = sqlx::query(
        "UPDATE payout_ledger SET status = 'eligible', updated_at = $1 WHERE id = $2 AND status = 'pending' AND \
         available_at <= $3",
    )
    .bind(now)
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn promote_all_entries(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, SplitLedgerError> {
    let result = sqlx::query(
        "UPDATE payout_ledger SET status = 'eligible', updated_at = $1 WHERE status = 'pending' AND available_at <= $2",
    )
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    let promoted = result.rows_affected();
    debug!("🗃️ {promoted} ledger entries promoted to eligible");
    Ok(promoted)
}

/// Marks an `eligible` entry as paid. Returns `None` if the entry was not eligible.
pub async fn mark_paid(
    id: i64,
    payout_reference: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, SplitLedgerError> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
            UPDATE payout_ledger
            SET status = 'paid', paid_at = $1, payout_reference = $2, updated_at = $3
            WHERE id = $4 AND status = 'eligible'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(payout_reference)
    .bind(now)
    .bind(id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next();
    Ok(entry)
}

pub async fn count_unpaid_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<i64, SplitLedgerError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payout_ledger WHERE order_id = $1 AND status <> 'paid'",
    )
    .bind(order_id.as_str())
    .fetch_all(conn)
    .await
    .map_err(SplitLedgerError::from)
    .and_then(single_row)?;
    Ok(count)
}
