//! #  Storage contracts for the split engine.
//!
//! This module provides the interfaces that define the contracts of the split engine storage *backends*.
//!
//! ## Splits and the payout ledger
//! A payment split is the frozen decision of how an order's money divides between supplier, reseller and platform.
//! The payout ledger is the append-only record of what is owed to each of them, when it becomes payable, and when it
//! was paid out.
//!
//! ## Traits
//! * [`SplitLedgerDatabase`] defines the transactional split and ledger operations. Every method that writes more than
//!   one row does so atomically.
//! * [`OrderManagement`] gives read access to orders, plus the writes the order subsystem uses to keep them current.
//! * [`PolicyProvider`] looks up the commission tier for a supplier.
//! * [`AuditLog`] stores audit records for split activity.
mod audit_log;
mod data_objects;
mod order_management;
mod policy_provider;
mod split_ledger_database;

pub use audit_log::AuditLog;
pub use data_objects::{InsertOrderResult, InsertSplitResult, MarkPaidResult, ReverseSplitResult};
pub use order_management::OrderManagement;
pub use policy_provider::{NoTierSystem, PolicyLookupError, PolicyProvider};
pub use split_ledger_database::{SplitLedgerDatabase, SplitLedgerError};
