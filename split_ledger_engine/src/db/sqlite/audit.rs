use chrono::Utc;
use sqlx::{types::Json, SqliteConnection};

use super::single_row;
use crate::{
    db::traits::SplitLedgerError,
    db_types::{AuditEntry, NewAuditEntry, OrderId},
};

pub async fn insert_audit_entry(entry: NewAuditEntry, conn: &mut SqliteConnection) -> Result<i64, SplitLedgerError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO audit_log (order_id, action, actor, details, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(entry.order_id)
    .bind(entry.action)
    .bind(entry.actor)
    .bind(Json(entry.details))
    .bind(Utc::now())
    .fetch_all(conn)
    .await
    .map_err(SplitLedgerError::from)
    .and_then(single_row)?;
    Ok(id)
}

pub async fn fetch_audit_log(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<AuditEntry>, SplitLedgerError> {
    let entries = sqlx::query_as::<_, AuditEntry>("SELECT * FROM audit_log WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
