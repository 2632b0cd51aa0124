//! Bounded polling of conditions
//!
//! Every supervisor timeout is a condition re-checked on an interval until
//! it holds or the deadline passes.

use super::error::ConditionTimeout;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Re-check `condition` every `interval` until it holds or `timeout` elapses
///
/// The condition is checked once before the first sleep, so a condition
/// that already holds resolves immediately even with a zero timeout.
pub async fn poll_until<F, Fut>(
    mut condition: F,
    timeout: Duration,
    interval: Duration,
) -> Result<(), ConditionTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ConditionTimeout(timeout));
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
