//! Timeout Module
//!
//! Races an operation against a deadline without cancelling the work.

use std::future::Future;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Races `fut` against a timer of `timeout_ms` milliseconds.
///
/// The operation is spawned onto the runtime, so when the timer wins the
/// spawned work keeps running in the background and only its result is
/// discarded. Callers must tolerate that orphaned work completing later, store
/// writes included.
///
/// # Arguments
/// * `fut` - The operation to bound
/// * `timeout_ms` - Deadline in milliseconds
pub async fn with_timeout<T, F>(fut: F, timeout_ms: u64) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);

    tokio::select! {
        joined = handle => match joined {
            Ok(result) => result,
            Err(err) => Err(CacheError::Producer(anyhow::anyhow!(
                "background task failed: {}",
                err
            ))),
        },
        _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
            Err(CacheError::Timeout(timeout_ms))
        }
    }
}
