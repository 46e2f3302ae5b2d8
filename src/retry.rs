// src/retry.rs
//! Bounded exponential backoff around the external-call boundaries.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{MinerError, MinerResult};

/// Run `op` up to `cfg.max_attempts` times, sleeping between attempts.
/// Quota failures back off from `quota_delay_ms`, everything else retryable
/// from `base_delay_ms`; delays double per attempt. Non-retryable errors
/// surface immediately.
pub async fn with_backoff<T, F, Fut>(cfg: &RetryConfig, op_name: &str, mut op: F) -> MinerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MinerResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < cfg.max_attempts => {
                let base = if e.is_quota() {
                    cfg.quota_delay_ms
                } else {
                    cfg.base_delay_ms
                };
                let delay = base.saturating_mul(1u64 << attempt.min(6));
                warn!(op = op_name, attempt, error = %e, delay_ms = delay, "retrying after failure");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
