//! Bounded retries for transient storage failures.
use std::{future::Future, time::Duration};

use log::*;
use rand::Rng;

use crate::db::traits::SplitLedgerError;

pub const DEFAULT_MAX_TX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(5_000);
const DEFAULT_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Each attempt is abandoned, and its transaction rolled back, if it takes longer than this
    pub attempt_timeout: Duration,
    /// The wait before attempt `n + 1` is `n * backoff`, plus up to `backoff` of jitter
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_TX_ATTEMPTS, attempt_timeout: DEFAULT_TRANSACTION_TIMEOUT, backoff: DEFAULT_BACKOFF }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self { max_attempts, attempt_timeout, ..Default::default() }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        let max_jitter = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX);
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        self.backoff * attempt + Duration::from_millis(jitter)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the attempts run out.
    ///
    /// An attempt that exceeds `attempt_timeout` is dropped (rolling back any open transaction) and counts as a
    /// transient failure.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, SplitLedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SplitLedgerError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(SplitLedgerError::TransientStorage(format!(
                    "{label} did not complete within {}ms",
                    self.attempt_timeout.as_millis()
                ))),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.delay_before(attempt);
                    debug!("🔀️ {label} failed on attempt {attempt} of {attempts}. Retrying in {delay:?}. {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) if e.is_retryable() => {
                    warn!("🔀️ {label} failed after {attempts} attempts. The caller may retry. {e}");
                    return Err(e);
                },
                other => return other,
            }
        }
    }
}
