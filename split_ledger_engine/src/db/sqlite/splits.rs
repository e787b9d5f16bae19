use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use super::{is_unique_violation, single_row};
use crate::{
    db::traits::SplitLedgerError,
    db_types::{NewPaymentSplit, OrderId, PaymentSplit, SplitStatus, SplitUpdate},
};

pub async fn fetch_split_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentSplit>, SplitLedgerError> {
    let split = sqlx::query_as::<_, PaymentSplit>("SELECT * FROM payment_splits WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?
        .into_iter()
        .next();
    Ok(split)
}

/// Inserts the split in the `pending` state.
///
/// Returns `None` if a split for the order already exists, which can only happen if another transaction committed one
/// after this transaction's idempotency check.
pub async fn insert_pending_split(
    split: NewPaymentSplit,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentSplit>, SplitLedgerError> {
    let result = sqlx::query_as::<_, PaymentSplit>(
        r#"
            INSERT INTO payment_splits (
                store_id,
                order_id,
                payment_id,
                total_amount,
                supplier_id,
                supplier_amount,
                reseller_id,
                reseller_amount,
                platform_amount,
                status,
                payment_method,
                metadata,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *;
        "#,
    )
    .bind(split.store_id)
    .bind(split.order_id)
    .bind(split.payment_id)
    .bind(split.total_amount)
    .bind(split.supplier_id)
    .bind(split.supplier_amount)
    .bind(split.reseller_id)
    .bind(split.reseller_amount)
    .bind(split.platform_amount)
    .bind(SplitStatus::Pending)
    .bind(split.payment_method)
    .bind(Json(split.metadata))
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await
    .map_err(Some)
    .and_then(|rows| rows.into_iter().next().ok_or(None));
    match result {
        Ok(split) => {
            debug!("🗃️ Split {} for order {} inserted as pending", split.id, split.order_id);
            Ok(Some(split))
        },
        Err(Some(e)) if is_unique_violation(&e) => Ok(None),
        Err(Some(e)) => Err(e.into()),
        Err(None) => Err(sqlx::Error::RowNotFound.into()),
    }
}

/// Moves the split from `from` to `to`, as long as it is still in `from`. Returns `None` if the split was not in the
/// expected state.
pub async fn update_split_status(
    id: i64,
    from: SplitStatus,
    to: SplitStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentSplit>, SplitLedgerError> {
    let split = sqlx::query_as::<_, PaymentSplit>(
        "UPDATE payment_splits SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(to)
    .bind(now)
    .bind(id)
    .bind(from)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next();
    if let Some(s) = &split {
        debug!("🗃️ Split {id} for order {} moved from {from} to {to}", s.order_id);
    }
    Ok(split)
}

/// Writes an administrative update. The caller is responsible for validating it first.
pub(crate) async fn apply_split_update(
    id: i64,
    update: SplitUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentSplit, SplitLedgerError> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE payment_splits SET updated_at = ");
    builder.push_bind(now);
    if let Some(total) = update.total_amount {
        builder.push(", total_amount = ");
        builder.push_bind(total);
    }
    if let Some(amount) = update.supplier_amount {
        builder.push(", supplier_amount = ");
        builder.push_bind(amount);
    }
    if let Some(amount) = update.reseller_amount {
        builder.push(", reseller_amount = ");
        builder.push_bind(amount);
    }
    if let Some(amount) = update.platform_amount {
        builder.push(", platform_amount = ");
        builder.push_bind(amount);
    }
    if let Some(payment_id) = update.payment_id {
        builder.push(", payment_id = ");
        builder.push_bind(payment_id);
    }
    if let Some(method) = update.payment_method {
        builder.push(", payment_method = ");
        builder.push_bind(method);
    }
    if let Some(status) = update.status {
        builder.push(", status = ");
        builder.push_bind(status);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<PaymentSplit>().fetch_all(conn).await?;
    single_row(rows)
}
