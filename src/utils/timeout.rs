//! Deadline helpers over `tokio::time`.
//!
//! Every blocking I/O step in the crate goes through one of these so a missed
//! deadline always surfaces as [`ProtocolError::Timeout`].

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ProtocolError, Result};

/// Default timeout for client calls and server frame I/O
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a shutdown waits before logging that handlers are still running
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Turn an optional timeout into an optional absolute deadline
pub fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}

/// Run `fut`, failing with `Timeout` if `deadline` passes first.
/// `None` waits indefinitely.
pub async fn with_deadline<F, T>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| ProtocolError::Timeout)?,
        None => fut.await,
    }
}

/// Run `fut` with a relative timeout
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_elapses() {
        let deadline = deadline_after(Some(Duration::from_millis(20)));
        let result: Result<()> = with_deadline(deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_no_deadline_waits() {
        let value = with_deadline(None, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(5)
        })
        .await
        .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_relative_timeout_passes_inner_error_through() {
        let result: Result<()> = with_timeout_error(
            async { Err(ProtocolError::ConnectionClosed) },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }
}
