pub mod db;

pub mod audit;
pub mod ledger;
pub mod orders;
pub mod splits;
pub mod tiers;

use std::{env, str::FromStr, time::Duration};

pub use db::SqliteDatabase;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::db::traits::SplitLedgerError;

const SQLITE_DB_URL: &str = "sqlite://data/split_ledger.db";
/// How long a connection waits on a locked database before giving up with `SQLITE_BUSY`
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("SLE_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ SLE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SplitLedgerError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// True if the error is a uniqueness-constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Single-row queries in this module are run with `fetch_all` and narrowed with this helper (or
/// `into_iter().next()`), rather than with `fetch_one`/`fetch_optional`.
///
/// A SQLite statement that is abandoned after its first row is not reset, and keeps its read snapshot open on the
/// pooled connection. Later reads on that connection would then miss writes committed by other connections.
pub(crate) fn single_row<T>(rows: Vec<T>) -> Result<T, SplitLedgerError> {
    rows.into_iter().next().ok_or_else(|| SplitLedgerError::from(sqlx::Error::RowNotFound))
}
