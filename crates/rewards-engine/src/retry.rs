//! Bounded retry with linear backoff for collaborator calls.

use crate::config::RetryConfig;
use anyhow::Result;
use std::future::Future;
use tracing::warn;

/// Run `op` until it succeeds or the configured attempts are exhausted.
/// The final error is returned unchanged.
pub(crate) async fn with_retry<T, F, Fut>(retry: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                let delay = retry.backoff * attempt;
                warn!(
                    "{what} failed (attempt {attempt}/{attempts}), retrying in {delay:?}: {err:#}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
