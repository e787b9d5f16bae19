//! # Split ledger engine public API
//!
//! * [`split_flow_api`] runs the forward path when an order's payment is confirmed, and the reversal path when an
//!   order is cancelled or refunded. It also carries the administrative split correction path.
//! * [`payout_api`] marks ledger entries as paid and answers the read-only dashboard queries.
//! * [`policy_api`] resolves the commission and settlement delay for a supplier. It never fails.
//!
//! Every API is created by supplying a backend that implements the storage traits it needs:
//!
//! ```rust,ignore
//! use split_ledger_engine::{events::EventProducers, PolicyResolver, SplitFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/split_ledger.db", 5).await?;
//! db.run_migrations().await?;
//! let policy = PolicyResolver::new(db.clone(), Default::default(), std::time::Duration::from_millis(500));
//! let api = SplitFlowApi::new(db, policy, EventProducers::default());
//! let outcome = api.on_order_confirmed(&order, Some("pi_123".into()), None).await?;
//! ```
pub mod payout_api;
pub mod policy_api;
pub mod retry;
pub mod split_flow_api;
pub mod split_objects;
