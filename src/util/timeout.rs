//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, TaskloopError};

/// Wrap a fallible future with a timeout. A zero duration disables the limit.
pub async fn with_timeout<T>(duration: Duration, future: impl Future<Output = Result<T>>) -> Result<T> {
    if duration.is_zero() {
        return future.await;
    }
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TaskloopError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_future_becomes_timeout_error() {
        let result: Result<()> = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TaskloopError::Timeout(1000))));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_waits_indefinitely() {
        let result = with_timeout(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
