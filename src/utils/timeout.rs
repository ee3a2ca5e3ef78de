//! Timeout constants and async timeout wrappers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default bound on TCP connect plus TLS upgrade
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the connect workflow waits for the `client ip` reply
pub const CLIENT_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between keep-alive pings
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Bound on flushing the command stream during shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run `future`, mapping expiry to [`ProtocolError::Timeout`]
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expiry_maps_to_timeout() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let result: Result<()> =
            with_timeout_error(async { Err(ProtocolError::NotConnected) }, DEFAULT_TIMEOUT).await;
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
    }
}
