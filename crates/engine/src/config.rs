//! Engine configuration.

use std::future::Future;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Tunable settings shared by the engine services.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound for a single operation, store round trips included.
    pub op_timeout: Duration,

    /// Capacity of the message feed broadcast channel.
    pub feed_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(5),
            feed_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Replaces the operation timeout.
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

/// Runs `op` under the given deadline, mapping elapse to a retryable
/// [`EngineError::Timeout`].
pub(crate) async fn bounded<T>(limit: Duration, op: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.op_timeout, Duration::from_secs(5));
        assert_eq!(config.feed_capacity, 256);
    }

    #[tokio::test]
    async fn bounded_passes_result_through() {
        let ok = bounded(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn bounded_maps_elapse_to_timeout() {
        let result: Result<()> = bounded(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
