use chrono::Utc;
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use super::single_row;
use crate::{
    db::traits::{InsertOrderResult, SplitLedgerError},
    db_types::{NewOrder, Order, OrderId, OrderUpdate},
};

pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SplitLedgerError> {
    let result = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(existing) => InsertOrderResult::AlreadyExists(existing),
        None => InsertOrderResult::Inserted(insert_order(order, conn).await?),
    };
    Ok(result)
}

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SplitLedgerError> {
    let now = Utc::now();
    let order = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO orders (
                order_id,
                store_id,
                supplier_id,
                reseller_id,
                total_amount,
                payment_method,
                status,
                payment_status,
                items,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.store_id)
    .bind(order.supplier_id)
    .bind(order.reseller_id)
    .bind(order.total_amount)
    .bind(order.payment_method)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(Json(order.items))
    .bind(order.created_at)
    .bind(now)
    .fetch_all(conn)
    .await
    .map_err(SplitLedgerError::from)
    .and_then(single_row)?;
    debug!("🗃️ Order {} saved with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SplitLedgerError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?
        .into_iter()
        .next();
    Ok(order)
}

pub(crate) async fn update_order(
    order_id: &OrderId,
    update: OrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SplitLedgerError> {
    if update.is_empty() {
        debug!("🗃️ No fields to update for order {order_id}. Update request skipped.");
        return fetch_order_by_order_id(order_id, conn).await;
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET updated_at = ");
    builder.push_bind(Utc::now());
    if let Some(status) = update.status {
        builder.push(", status = ");
        builder.push_bind(status);
    }
    if let Some(payment_status) = update.payment_status {
        builder.push(", payment_status = ");
        builder.push_bind(payment_status);
    }
    builder.push(" WHERE order_id = ");
    builder.push_bind(order_id.as_str().to_string());
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_all(conn).await?.into_iter().next();
    trace!("🗃️ Result of update_order: {order:?}");
    Ok(order)
}
