//! Retry and timeout wrapper shared by every provider.
//!
//! Each attempt runs under its own deadline. Attempt failures are logged at
//! warn level; the caller only sees one aggregated
//! [`SecretsError::ResolutionFailed`] once attempts are exhausted.

use super::provider::SecretProvider;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::mask::mask_source;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use validator::Validate;

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

/// How many times and how patiently a provider call is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 10, message = "max_attempts must be between 1 and 10"))]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Factor applied to the delay after every failed attempt (1.0 = fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    #[validate(range(min = 1.0, max = 10.0, message = "backoff_multiplier must be between 1 and 10"))]
    pub backoff_multiplier: f64,

    /// Deadline for a single attempt
    #[serde(default = "default_attempt_timeout_ms")]
    #[validate(range(min = 1, message = "attempt_timeout_ms must be positive"))]
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once with the given deadline.
    pub fn single_attempt(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout_ms: attempt_timeout.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Per-attempt deadline as Duration
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.retry_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    }
}

/// Resolve `source` through `provider`, applying its retry policy.
pub async fn resolve_with_retry(provider: &dyn SecretProvider, source: &str) -> Result<String> {
    let policy = provider.retry_policy();
    let max_attempts = policy.max_attempts.max(1);
    let masked = mask_source(source);
    let mut last_error: Option<SecretsError> = None;

    for attempt in 1..=max_attempts {
        debug!(
            provider = %provider.name(),
            source = %masked,
            attempt,
            max_attempts,
            "Resolving secret"
        );

        let outcome = match tokio::time::timeout(policy.attempt_timeout(), provider.resolve(source))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SecretsError::timeout(provider.name(), policy.attempt_timeout_ms)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => {
                warn!(
                    provider = %provider.name(),
                    source = %masked,
                    attempt,
                    error = %err,
                    "Secret resolution failed permanently"
                );
                return Err(SecretsError::resolution_failed(provider.name(), attempt, err));
            }
            Err(err) => {
                warn!(
                    provider = %provider.name(),
                    source = %masked,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Secret resolution attempt failed"
                );
                last_error = Some(err);
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    Err(SecretsError::resolution_failed(
        provider.name(),
        max_attempts,
        last_error.unwrap_or_else(|| SecretsError::backend_error("no attempt was made")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyProvider {
        calls: AtomicU32,
        fail_times: u32,
        hang: bool,
        permanent: bool,
        policy: RetryPolicy,
    }

    impl FlakyProvider {
        fn new(fail_times: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_times,
                hang: false,
                permanent: false,
                policy: RetryPolicy {
                    max_attempts: 3,
                    retry_delay_ms: 100,
                    backoff_multiplier: 2.0,
                    attempt_timeout_ms: 1_000,
                },
            }
        }
    }

    #[async_trait]
    impl SecretProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn can_handle(&self, source: &str) -> bool {
            source.starts_with("flaky://")
        }

        async fn resolve(&self, _source: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.permanent {
                return Err(SecretsError::invalid_source("flaky://***", "bad"));
            }
            if call <= self.fail_times {
                Err(SecretsError::backend_error("unavailable"))
            } else {
                Ok("resolved".to_string())
            }
        }

        async fn test_connection(&self) -> bool {
            true
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy
        }
    }

    #[test]
    fn test_delay_backoff() {
        let policy = RetryPolicy { retry_delay_ms: 100, backoff_multiplier: 2.0, ..Default::default() };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));

        let fixed = RetryPolicy { retry_delay_ms: 250, backoff_multiplier: 1.0, ..Default::default() };
        assert_eq!(fixed.delay_after(4), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let provider = FlakyProvider::new(2);
        let value = resolve_with_retry(&provider, "flaky://x").await.unwrap();
        assert_eq!(value, "resolved");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_aggregate_error() {
        let provider = FlakyProvider::new(10);
        let err = resolve_with_retry(&provider, "flaky://x").await.unwrap_err();
        match err {
            SecretsError::ResolutionFailed { provider: name, attempts, cause } => {
                assert_eq!(name, "flaky");
                assert_eq!(attempts, 3);
                assert!(matches!(*cause, SecretsError::Backend { .. }));
                assert!(cause.to_string().contains("unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let mut provider = FlakyProvider::new(0);
        provider.hang = true;
        let err = resolve_with_retry(&provider, "flaky://x").await.unwrap_err();
        match err {
            SecretsError::ResolutionFailed { attempts, cause, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*cause, SecretsError::Timeout { duration_ms: 1_000, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let mut provider = FlakyProvider::new(0);
        provider.permanent = true;
        let err = resolve_with_retry(&provider, "flaky://x").await.unwrap_err();
        assert!(matches!(err, SecretsError::ResolutionFailed { attempts: 1, .. }));
        assert!(matches!(err.root_cause(), SecretsError::InvalidSource { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
