use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use sle_common::parse_boolean_flag;

use crate::{
    helpers::{validate_commission_percent, validate_settlement_delay},
    sle_api::{
        policy_api::{
            PolicyDefaults,
            DEFAULT_COMMISSION_PERCENT,
            DEFAULT_POLICY_LOOKUP_TIMEOUT,
            DEFAULT_SETTLEMENT_DELAY_DAYS,
        },
        retry::{RetryPolicy, DEFAULT_MAX_TX_ATTEMPTS, DEFAULT_TRANSACTION_TIMEOUT},
    },
};

const DEFAULT_SLE_DATABASE_URL: &str = "sqlite://data/split_ledger.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug, PartialEq)]
pub struct SplitLedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Commission used when a supplier has no tier, or the tier lookup fails
    pub default_commission_percent: f64,
    /// Settlement delay used when a supplier has no tier, or the tier lookup fails
    pub default_settlement_delay_days: i64,
    pub policy_lookup_timeout: Duration,
    /// The execution budget for a single attempt at a split or ledger transaction
    pub transaction_timeout: Duration,
    pub max_tx_attempts: u32,
    /// If false, no audit records are written
    pub audit_enabled: bool,
    pub event_buffer_size: usize,
}

impl Default for SplitLedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_SLE_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            default_commission_percent: DEFAULT_COMMISSION_PERCENT,
            default_settlement_delay_days: DEFAULT_SETTLEMENT_DELAY_DAYS,
            policy_lookup_timeout: DEFAULT_POLICY_LOOKUP_TIMEOUT,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_tx_attempts: DEFAULT_MAX_TX_ATTEMPTS,
            audit_enabled: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

/// Reads `key` through `lookup` and parses it. Missing values silently give the default. Unparseable or invalid values
/// are logged and give the default.
fn parse_var<T, F>(lookup: &F, key: &str, default: T, is_valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(s) = lookup(key) else {
        return default;
    };
    match s.trim().parse::<T>() {
        Ok(v) if is_valid(&v) => v,
        Ok(v) => {
            error!("🪛️ {v} is out of range for {key}. Using the default, {default}, instead.");
            default
        },
        Err(e) => {
            error!("🪛️ {s} is not a valid value for {key}. {e} Using the default, {default}, instead.");
            default
        },
    }
}

impl SplitLedgerConfig {
    pub fn new(database_url: &str) -> Self {
        Self { database_url: database_url.to_string(), ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let database_url = lookup("SLE_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ SLE_DATABASE_URL is not set. Using {DEFAULT_SLE_DATABASE_URL}.");
            DEFAULT_SLE_DATABASE_URL.to_string()
        });
        let max_connections = parse_var(&lookup, "SLE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS, |&n| n > 0);
        let default_commission_percent =
            parse_var(&lookup, "SLE_DEFAULT_COMMISSION_PERCENT", DEFAULT_COMMISSION_PERCENT, |&p| {
                validate_commission_percent(p).is_ok()
            });
        let default_settlement_delay_days =
            parse_var(&lookup, "SLE_DEFAULT_SETTLEMENT_DELAY_DAYS", DEFAULT_SETTLEMENT_DELAY_DAYS, |&d| {
                validate_settlement_delay(d).is_ok()
            });
        let default_lookup_ms = u64::try_from(DEFAULT_POLICY_LOOKUP_TIMEOUT.as_millis()).unwrap_or(u64::MAX);
        let policy_lookup_timeout =
            Duration::from_millis(parse_var(&lookup, "SLE_POLICY_LOOKUP_TIMEOUT_MS", default_lookup_ms, |&ms| ms > 0));
        let default_tx_ms = u64::try_from(DEFAULT_TRANSACTION_TIMEOUT.as_millis()).unwrap_or(u64::MAX);
        let transaction_timeout =
            Duration::from_millis(parse_var(&lookup, "SLE_TRANSACTION_TIMEOUT_MS", default_tx_ms, |&ms| ms > 0));
        let max_tx_attempts = parse_var(&lookup, "SLE_MAX_TX_ATTEMPTS", DEFAULT_MAX_TX_ATTEMPTS, |&n| n > 0);
        let audit_enabled = parse_boolean_flag(lookup("SLE_AUDIT_ENABLED"), true);
        if !audit_enabled {
            warn!("🪛️ Audit records are disabled. Split and payout activity will not be audited.");
        }
        let event_buffer_size = parse_var(&lookup, "SLE_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE, |&n| n > 0);
        Self {
            database_url,
            max_connections,
            default_commission_percent,
            default_settlement_delay_days,
            policy_lookup_timeout,
            transaction_timeout,
            max_tx_attempts,
            audit_enabled,
            event_buffer_size,
        }
    }

    pub fn policy_defaults(&self) -> PolicyDefaults {
        PolicyDefaults {
            commission_percent: self.default_commission_percent,
            settlement_delay_days: self.default_settlement_delay_days,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_tx_attempts, self.transaction_timeout)
    }
}
