use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::circuit::CircuitBreaker;
use crate::error::DaemonError;
use crate::retry::RetryPolicy;

/// Wraps a single call to a backend daemon with the retry + circuit-breaker
/// policy of spec §4.2. `name` identifies the daemon in logs and in
/// [`DaemonError`] variants; `op` identifies the specific operation.
///
/// Generalizes `NetworkLnRpcClient::connect`'s retry-with-sleep loop
/// (`gateway/ln-gateway/src/lightning/cln.rs`) into a reusable wrapper any
/// of the three daemon adapters can call for any operation.
pub struct ResilientCall {
    pub name: &'static str,
    pub breaker: CircuitBreaker,
    pub retry: RetryPolicy,
}

impl ResilientCall {
    pub fn new(name: &'static str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name,
            breaker: CircuitBreaker::new(failure_threshold, cooldown),
            retry: RetryPolicy::default(),
        }
    }

    /// Runs `f` up to `retry.max_attempts` times with exponential backoff,
    /// short-circuiting immediately if the breaker is open and stopping
    /// retries as soon as an error is not transient (spec §7 "Backend
    /// transient" vs "Backend conflict").
    pub async fn call<F, Fut, T>(&self, op: &'static str, mut f: F) -> Result<T, DaemonError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DaemonError>>,
    {
        if !self.breaker.allow_call().await {
            return Err(DaemonError::CircuitOpen { daemon: self.name });
        }

        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    self.breaker.record_failure().await;
                    let delay = self.retry.delay_for(attempt);
                    warn!(daemon = self.name, op, attempt, ?delay, "retrying after transient error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.breaker.record_failure().await;
                    debug!(daemon = self.name, op, "giving up after {} attempts", attempt + 1);
                    return Err(err);
                }
            }
        }
    }
}
