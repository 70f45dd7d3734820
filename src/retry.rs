//! Retry Module
//!
//! Bounded retry wrapper for fallible async operations.

use std::future::Future;

/// Invokes `op` up to `times` times, returning the first success.
///
/// No backoff is applied between attempts. When every attempt fails, the final
/// error is returned. `times <= 1` means a single attempt.
///
/// # Arguments
/// * `op` - Factory producing a fresh future per attempt
/// * `times` - Total attempt budget
pub async fn retry<T, E, F, Fut>(mut op: F, times: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = times.max(1);

    let mut last_err = None;
    for _ in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
    }

    // attempts >= 1, so at least one error was recorded
    Err(last_err.expect("retry ran zero attempts"))
}
