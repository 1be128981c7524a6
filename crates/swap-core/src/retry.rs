use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SwapError;

/// Retry an async operation with a fixed delay between attempts.
///
/// Only transient errors are retried. Cancellation aborts both a running
/// attempt and the wait before the next one.
pub async fn retry_with_cancel<F, Fut, T>(
    attempts: usize,
    delay: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, SwapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SwapError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(SwapError::Cancelled),
            result = op() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(attempt, error = %err, "transient failure, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SwapError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}
