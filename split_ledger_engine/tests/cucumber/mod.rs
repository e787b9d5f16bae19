mod setups;
mod split_ledger_world;
mod steps;

pub use split_ledger_world::SplitLedgerWorld;
