use super::{LoadStats, Sink, SinkError};
use crate::config::types::RetryConfig;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff between attempts at the same write
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = Duration::from_millis(millis.min(u64::MAX as f64) as u64);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Retries transient failures of the inner sink
pub struct RetryingSink {
    inner: Arc<dyn Sink>,
    policy: RetryPolicy,
}

impl RetryingSink {
    pub fn new(inner: Arc<dyn Sink>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Sink for RetryingSink {
    async fn write(&self, batch: Bytes, table_id: &str) -> Result<LoadStats, SinkError> {
        let mut attempt = 1;
        loop {
            match self.inner.write(batch.clone(), table_id).await {
                Ok(stats) => return Ok(stats),
                Err(e) if e.is_transient() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        table_id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::FlakySink;
    use std::sync::atomic::Ordering;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_grows_then_caps() {
        let p = policy(10);
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(400));
        assert_eq!(p.delay(5), Duration::from_secs(1));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried_until_success() {
        let inner = Arc::new(FlakySink::failing(2));
        let sink = RetryingSink::new(inner.clone(), policy(3));

        let stats = sink.write(Bytes::from_static(b"batch"), "events").await.unwrap();

        assert_eq!(stats.input_bytes, 5);
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(inner.written.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakySink::failing(5));
        let sink = RetryingSink::new(inner.clone(), policy(3));

        let result = sink.write(Bytes::from_static(b"batch"), "events").await;

        assert!(matches!(result, Err(SinkError::Status { status: 503, .. })));
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let inner = Arc::new(FlakySink {
            permanent: true,
            ..FlakySink::failing(1)
        });
        let sink = RetryingSink::new(inner.clone(), policy(3));

        assert!(sink.write(Bytes::from_static(b"batch"), "events").await.is_err());
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 1);
    }
}
