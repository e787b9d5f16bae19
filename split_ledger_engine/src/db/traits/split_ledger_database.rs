use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db::traits::{InsertSplitResult, MarkPaidResult, ReverseSplitResult},
    db_types::{EntityType, LedgerEntry, LedgerSummary, NewPaymentSplit, OrderId, PaymentSplit, SplitUpdate},
    helpers::ValidationError,
};

/// This trait defines the storage behaviour the split engine relies on.
///
/// Backends must guarantee that
/// * `order_id` is unique across splits, and
/// * the multi-row writes below (`insert_locked_split`, `reverse_split` and `mark_entry_paid`) are atomic.
///
/// Concurrency control is left entirely to the backend's transactions and uniqueness constraints. There is no
/// application level locking.
#[allow(async_fn_in_trait)]
pub trait SplitLedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Fetches the split for the given order, if one exists.
    async fn fetch_split_for_order(&self, order_id: &OrderId) -> Result<Option<PaymentSplit>, SplitLedgerError>;

    /// Fetches every ledger entry (forward and reversal) for the given order, oldest first.
    async fn fetch_ledger_for_order(&self, order_id: &OrderId) -> Result<Vec<LedgerEntry>, SplitLedgerError>;

    /// Fetches the split and its ledger entries together, from a single consistent read.
    async fn fetch_split_and_ledger(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(PaymentSplit, Vec<LedgerEntry>)>, SplitLedgerError>;

    async fn fetch_ledger_entry(&self, entry_id: i64) -> Result<Option<LedgerEntry>, SplitLedgerError>;

    /// In a single atomic transaction,
    /// * re-reads the split for the order. If one exists, nothing is written and the existing split is returned.
    /// * validates and stores the split as `pending`
    /// * transitions it to `locked`
    /// * writes the three forward ledger entries with the given `available_at`.
    ///
    /// If a concurrent writer wins the race on `order_id`, the loser's uniqueness violation is converted into
    /// [`InsertSplitResult::AlreadyExists`].
    async fn insert_locked_split(
        &self,
        split: NewPaymentSplit,
        available_at: DateTime<Utc>,
    ) -> Result<InsertSplitResult, SplitLedgerError>;

    /// In a single atomic transaction, writes a negative entry mirroring each forward entry of the order, and
    /// settles the split if it is still locked.
    ///
    /// The call is idempotent. If reversal entries already exist for the order, nothing is written.
    async fn reverse_split(
        &self,
        order_id: &OrderId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ReverseSplitResult, SplitLedgerError>;

    /// Marks a ledger entry as paid, recording the external payout reference.
    ///
    /// ## Failure modes:
    /// - [`SplitLedgerError::EntryNotFound`] if there is no such entry.
    /// - [`SplitLedgerError::AlreadyPaid`] if the entry has already been paid.
    /// - [`SplitLedgerError::NotEligible`] if `available_at` is still in the future.
    ///
    /// If this was the last unpaid entry of the split, the split is settled in the same transaction.
    async fn mark_entry_paid(
        &self,
        entry_id: i64,
        payout_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<MarkPaidResult, SplitLedgerError>;

    /// Applies an administrative change to a split, after running it through
    /// [`crate::helpers::validate_split_update`].
    async fn update_split(&self, order_id: &OrderId, update: SplitUpdate) -> Result<PaymentSplit, SplitLedgerError>;

    /// Fetches the unpaid entries for a payee whose `available_at` has passed, excluding entries whose order has been
    /// cancelled or returned.
    async fn fetch_eligible_entries(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, SplitLedgerError>;

    /// Fetches every entry for a payee, oldest first.
    async fn fetch_entries_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<LedgerEntry>, SplitLedgerError>;

    /// Signed totals by effective status for the payee.
    async fn summarize_entries(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerSummary, SplitLedgerError> {
        let entries = self.fetch_entries_for_entity(entity_type, entity_id).await?;
        let summary = entries.iter().fold(LedgerSummary::empty(entity_type, entity_id), |mut summary, entry| {
            summary.add_entry(entry, now);
            summary
        });
        Ok(summary)
    }

    /// Moves every `pending` entry whose `available_at` has passed to `eligible`. Returns the number of entries
    /// promoted.
    async fn promote_eligible_entries(&self, now: DateTime<Utc>) -> Result<u64, SplitLedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SplitLedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SplitLedgerError {
    #[error("Validation failed. {0}")]
    Validation(#[from] ValidationError),
    #[error("Ledger entry {entry_id} is not eligible for payout until {available_at}")]
    NotEligible { entry_id: i64, available_at: DateTime<Utc> },
    #[error("Ledger entry {0} has already been paid")]
    AlreadyPaid(i64),
    #[error("Ledger entry {0} does not exist")]
    EntryNotFound(i64),
    #[error("There is no payment split for order {0}")]
    SplitNotFound(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Transient storage failure. It is safe to retry. {0}")]
    TransientStorage(String),
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
}

impl SplitLedgerError {
    /// True for failures that the caller can retry with the same arguments without operator involvement.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }

    /// True for failures that could leave money unaccounted for if ignored. These always need a human to look at
    /// them and must not be retried automatically.
    pub fn needs_investigation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::DatabaseError(_))
    }
}

/// SQLite reports contention as `SQLITE_BUSY` (5) or `SQLITE_LOCKED` (6), possibly with an extended code in the
/// upper bits.
fn is_contention_code(code: &str) -> bool {
    code.parse::<i32>().map(|c| matches!(c & 0xff, 5 | 6)).unwrap_or(false)
}

impl From<sqlx::Error> for SplitLedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => SplitLedgerError::TransientStorage(e.to_string()),
            sqlx::Error::Database(db) if db.code().map(|c| is_contention_code(&c)).unwrap_or(false) => {
                SplitLedgerError::TransientStorage(e.to_string())
            },
            _ => SplitLedgerError::DatabaseError(e.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for SplitLedgerError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        match e {
            sqlx::migrate::MigrateError::Execute(e) => e.into(),
            e => SplitLedgerError::DatabaseError(format!("Migration failed. {e}")),
        }
    }
}
