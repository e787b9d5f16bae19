//! Split-payment and payout ledger engine
//!
//! Once an order's payment is confirmed, this engine decides how much of it each of the three parties (supplier,
//! reseller and platform) is owed, freezes that decision, and tracks the eventual payouts through an append-only
//! ledger with delayed eligibility and reversal support.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@db`]). The traits in `db::traits` define what a backend must provide. SQLite is the supported
//!    backend. The data types stored by the backends are defined in [`mod@db_types`] and are public.
//! 2. The pure split calculator and the pre-commit validators ([`mod@helpers`]). These hold every money rule and can
//!    be exercised without a database.
//! 3. The public API ([`SplitFlowApi`], [`PayoutApi`] and [`PolicyResolver`]).
//!
//! The engine publishes events after each committed change to a split. See [`mod@events`] for how to subscribe.
pub mod config;
pub mod db;
pub mod db_types;
pub mod events;
pub mod helpers;
mod sle_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::SplitLedgerConfig;
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits::{
    AuditLog,
    InsertOrderResult,
    InsertSplitResult,
    MarkPaidResult,
    NoTierSystem,
    OrderManagement,
    PolicyLookupError,
    PolicyProvider,
    ReverseSplitResult,
    SplitLedgerDatabase,
    SplitLedgerError,
};
pub use sle_api::{
    payout_api::PayoutApi,
    policy_api::{PolicyDefaults, PolicyResolver, ResolvedPolicy},
    retry::RetryPolicy,
    split_flow_api::SplitFlowApi,
    split_objects::{ReversalOutcome, SplitOutcome, SplitWithLedger},
};
