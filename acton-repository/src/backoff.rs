//! Connection retry shared by the PostgreSQL and Redis backends

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Retry policy for establishing a pool
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    pub retries: u32,
    pub base: Duration,
}

impl Backoff {
    pub(crate) fn new(retries: u32, base_secs: u64) -> Self {
        Self {
            retries,
            base: Duration::from_secs(base_secs),
        }
    }

    /// Delay before retry `n` (1-based): `base * 2^(n-1)`
    pub(crate) fn delay(&self, retry: u32) -> Duration {
        self.base
            .saturating_mul(2_u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Run `connect` until it succeeds or the retries are spent
    pub(crate) async fn run<T, F, Fut>(&self, backend: &'static str, mut connect: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match connect().await {
                Ok(value) => {
                    tracing::info!(backend, attempts = retry + 1, "Connection pool ready");
                    return Ok(value);
                }
                Err(error) if retry >= self.retries => {
                    tracing::error!(backend, attempts = retry + 1, %error, "Giving up on connection");
                    return Err(error);
                }
                Err(error) => {
                    retry += 1;
                    let delay = self.delay(retry);
                    tracing::warn!(backend, retry, ?delay, %error, "Connection failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
