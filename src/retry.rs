//! Bounded retry of a single generation task.

use crate::error::Result;
use crate::types::MetadataResult;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt count and delay.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `attempt_fn` until it yields a successful result or attempts run out.
    ///
    /// Unsuccessful results and retryable errors consume an attempt. Pre-flight
    /// errors return immediately. The closure receives the 1-based attempt number.
    pub async fn run<F, Fut>(&self, label: &str, mut attempt_fn: F) -> MetadataResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<MetadataResult>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last = MetadataResult::failure("no attempt was made");

        for attempt in 1..=max_attempts {
            match attempt_fn(attempt).await {
                Ok(result) if result.success => {
                    if attempt > 1 {
                        tracing::info!(task = label, attempt, "succeeded after retry");
                    }
                    return result;
                }
                Ok(result) => {
                    tracing::warn!(task = label, attempt, max_attempts, error = %result.error, "attempt failed");
                    last = result;
                }
                Err(e) if e.is_preflight() => {
                    tracing::debug!(task = label, "not retrying: {e}");
                    return e.into();
                }
                Err(e) => {
                    tracing::warn!(task = label, attempt, max_attempts, "attempt errored: {e}");
                    last = if e.is_unexpected() {
                        MetadataResult::failure(format!(
                            "AI service error after {max_attempts} attempts: {e}"
                        ))
                    } else {
                        e.into()
                    };
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockMetaError;
    use crate::types::{Category, ProviderKind, Releases};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_result() -> MetadataResult {
        MetadataResult::success("t", vec!["k".into()], Category::Food, Releases::None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Ok(MetadataResult::failure(format!("fail {attempt}")))
                    } else {
                        Ok(ok_result())
                    }
                }
            })
            .await;

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_returns_last_failure() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = RetryPolicy::default()
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(MetadataResult::failure(format!("fail {attempt}"))) }
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.error, "fail 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= DEFAULT_RETRY_DELAY * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StockMetaError::NotConfigured(ProviderKind::Cohere)) }
            })
            .await;

        assert!(!result.success);
        assert!(result.error.contains("not configured"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_retried_and_kept() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StockMetaError::QuotaExceeded(ProviderKind::OpenAi)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result.error,
            "OpenAI API quota exceeded. Please check your account usage."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_error_folded() {
        let result = RetryPolicy::default()
            .run("test", |_| async {
                let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
                Err(StockMetaError::from(err))
            })
            .await;

        assert!(result.error.starts_with("AI service error after 3 attempts: JSON error"));
    }

    #[tokio::test]
    async fn test_zero_attempts_treated_as_one() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::new(0, Duration::ZERO)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(ok_result()) }
            })
            .await;

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
