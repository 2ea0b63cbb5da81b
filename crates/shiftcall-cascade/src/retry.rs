//! Exponential-backoff retry for transient send failures: up to 3 attempts,
//! base delay 500ms, factor 2, capped at 8s.

use shiftcall_core::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Retries `op` up to `policy.max_attempts` times, sleeping between
/// attempts per the backoff schedule. A `PermanentUpstream`/`NotFound`
/// error short-circuits immediately — only transient failures are retried.
pub async fn retry_transient<T, F, Fut>(policy: BackoffPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retry_safe() && attempt + 1 < policy.max_attempts => {
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
