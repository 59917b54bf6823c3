use std::future::Future;
use std::time::Duration;

use crate::config::AiRetryConfig;
use crate::error::AiServiceError;

/// Bounded exponential backoff for transient AI service errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AiRetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &AiRetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            max_retry_after: Duration::from_millis(cfg.max_retry_after_ms),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following failed attempt `attempt`
    /// (0-based), or `None` when the error is final.
    pub fn next_delay(&self, attempt: u32, error: &AiServiceError) -> Option<Duration> {
        if !error.is_retryable() || attempt.saturating_add(1) >= self.max_attempts {
            return None;
        }
        if let Some(hint) = error.retry_after() {
            return Some(hint.min(self.max_retry_after));
        }
        let exp = 1u32 << attempt.min(30);
        Some(self.base_delay.saturating_mul(exp).min(self.max_delay))
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, AiServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AiServiceError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) => match self.next_delay(attempt, &err) {
                    Some(delay) => {
                        tracing::warn!(
                            op = what,
                            attempt = attempt + 1,
                            kind = err.kind(),
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "retrying AI request"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(150),
            max_retry_after: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let p = policy();
        let conn = AiServiceError::Connection("reset".into());
        assert_eq!(p.next_delay(0, &conn), Some(Duration::from_millis(100)));
        assert_eq!(p.next_delay(1, &conn), Some(Duration::from_millis(150)));
        assert_eq!(p.next_delay(2, &conn), None);
    }

    #[test]
    fn test_retry_after_is_honoured_and_capped() {
        let p = policy();
        let limited = |secs| AiServiceError::RateLimit {
            retry_after: Some(Duration::from_secs(secs)),
            message: String::new(),
        };
        assert_eq!(p.next_delay(0, &limited(2)), Some(Duration::from_secs(2)));
        assert_eq!(p.next_delay(0, &limited(90)), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_auth_is_never_retried() {
        assert_eq!(
            policy().next_delay(0, &AiServiceError::Auth("nope".into())),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AiServiceError::Connection("down".into()))
            })
            .await;

        assert!(matches!(result, Err(AiServiceError::Connection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
