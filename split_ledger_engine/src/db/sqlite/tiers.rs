use log::debug;
use sqlx::SqliteConnection;

use super::single_row;
use crate::{
    db::traits::SplitLedgerError,
    db_types::{NewTier, TierPolicy},
};

pub async fn fetch_tier_for_supplier(
    supplier_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<TierPolicy>, SplitLedgerError> {
    let tier = sqlx::query_as::<_, TierPolicy>(
        r#"
            SELECT commission_tiers.id, name, commission_percent, settlement_delay_days
            FROM commission_tiers
            JOIN supplier_tier_assignments ON supplier_tier_assignments.tier_id = commission_tiers.id
            WHERE supplier_tier_assignments.supplier_id = $1
        "#,
    )
    .bind(supplier_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next();
    Ok(tier)
}

/// Creates the tier, or replaces the values of the tier with the same name.
pub async fn upsert_tier(tier: NewTier, conn: &mut SqliteConnection) -> Result<TierPolicy, SplitLedgerError> {
    let tier = sqlx::query_as::<_, TierPolicy>(
        r#"
            INSERT INTO commission_tiers (name, commission_percent, settlement_delay_days) VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET
                commission_percent = excluded.commission_percent,
                settlement_delay_days = excluded.settlement_delay_days,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id, name, commission_percent, settlement_delay_days;
        "#,
    )
    .bind(tier.name)
    .bind(tier.commission_percent)
    .bind(tier.settlement_delay_days)
    .fetch_all(conn)
    .await
    .map_err(SplitLedgerError::from)
    .and_then(single_row)?;
    debug!("🗃️ Commission tier {} saved: {tier:?}", tier.name);
    Ok(tier)
}

/// Assigns the named tier to the supplier, replacing any previous assignment. Returns false if there is no tier with
/// that name.
pub async fn assign_supplier_tier(
    supplier_id: &str,
    tier_name: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, SplitLedgerError> {
    let result = sqlx::query(
        r#"
            INSERT INTO supplier_tier_assignments (supplier_id, tier_id)
            SELECT $1, id FROM commission_tiers WHERE name = $2
            ON CONFLICT (supplier_id) DO UPDATE SET tier_id = excluded.tier_id, assigned_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(supplier_id)
    .bind(tier_name)
    .execute(conn)
    .await?;
    let assigned = result.rows_affected() > 0;
    if assigned {
        debug!("🗃️ Supplier {supplier_id} assigned to commission tier {tier_name}");
    }
    Ok(assigned)
}

pub async fn clear_supplier_tier(supplier_id: &str, conn: &mut SqliteConnection) -> Result<bool, SplitLedgerError> {
    let result = sqlx::query("DELETE FROM supplier_tier_assignments WHERE supplier_id = $1")
        .bind(supplier_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
