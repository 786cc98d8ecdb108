//! Timeout utilities for socket operations
//!
//! Wraps any future in an optional deadline using compio's timer.

use compio::time::timeout;
use std::future::Future;
use std::time::Duration;

/// Run `fut` with an optional deadline.
///
/// * `None` - block indefinitely (no timeout)
/// * `Some(duration)` - wait up to `duration`
///
/// Returns `Err(duration)` when the deadline elapsed; the inner future is
/// dropped at that point, which cancels it.
pub async fn with_timeout<F>(duration: Option<Duration>, fut: F) -> Result<F::Output, Duration>
where
    F: Future,
{
    match duration {
        None => Ok(fut.await),
        Some(d) => timeout(d, fut).await.map_err(|_elapsed| d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_no_deadline() {
        let out = with_timeout(None, async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[compio::test]
    async fn test_deadline_elapses() {
        let out = with_timeout(
            Some(Duration::from_millis(20)),
            compio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(out, Err(Duration::from_millis(20)));
    }

    #[compio::test]
    async fn test_completes_within_deadline() {
        let out = with_timeout(Some(Duration::from_secs(5)), async { "done" }).await;
        assert_eq!(out, Ok("done"));
    }
}
