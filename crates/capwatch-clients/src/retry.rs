//! Retry executor
//!
//! Wraps remote calls in a bounded retry loop with exponential backoff and
//! records the outcome against the service's health in the [`ClientRegistry`].

use capwatch_core::constants::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_RETRY_MAX_ATTEMPTS};
use capwatch_core::{ErrorKind, RemoteError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::ClientRegistry;

/// Retry budget and backoff schedule
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts for throttling and transient failures.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Per-attempt timeout. Expiry counts as a transient failure.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            call_timeout: Some(Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, call_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            call_timeout: Some(call_timeout),
            ..Self::default()
        }
    }

    /// Policy without backoff sleeps or timeouts.
    pub fn zero_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            call_timeout: None,
        }
    }

    /// Total attempts allowed for a failure of `kind`.
    ///
    /// Unknown failures get half the budget; non-retryable kinds get one attempt.
    pub fn attempts_for(&self, kind: ErrorKind) -> u32 {
        match kind {
            ErrorKind::Throttling | ErrorKind::Transient => self.max_attempts,
            ErrorKind::Unknown => (self.max_attempts / 2).max(1),
            _ => 1,
        }
    }

    /// Sleep before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Executes remote calls under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryExecutor {
    registry: Arc<ClientRegistry>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(registry: Arc<ClientRegistry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails with a non-retryable error or the
    /// budget for its error kind is spent.
    ///
    /// Success marks `service` healthy. Exhausting the budget marks it
    /// unhealthy. Permission, validation and not-found failures return
    /// immediately and leave health untouched.
    pub async fn call<T, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = match self.policy.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, call()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RemoteError::new(
                        ErrorKind::Transient,
                        service,
                        operation,
                        format!("call timed out after {}s", limit.as_secs_f64()),
                    )),
                },
                None => call().await,
            };

            let error = match outcome {
                Ok(value) => {
                    self.registry.mark_healthy(service).await;
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.kind.is_retryable() {
                tracing::debug!(
                    service = %service,
                    operation = %operation,
                    kind = %error.kind,
                    "Call failed with non-retryable error"
                );
                return Err(error.with_attempts(attempt));
            }

            let budget = self.policy.attempts_for(error.kind);
            if attempt >= budget {
                tracing::warn!(
                    service = %service,
                    operation = %operation,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                self.registry.mark_unhealthy(service, error.summary()).await;
                return Err(error.with_attempts(attempt));
            }

            let delay = self.policy.delay_for(attempt);
            tracing::debug!(
                service = %service,
                operation = %operation,
                attempt,
                kind = %error.kind,
                delay_ms = delay.as_millis() as u64,
                "Retrying after failure"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClientHandle, ServiceDeclaration};
    use crate::traits::{ListingClient, ListingPage};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NoopListing;

    #[async_trait]
    impl ListingClient for NoopListing {
        async fn invoke(
            &self,
            _operation: &str,
            _params: &Map<String, Value>,
        ) -> Result<ListingPage, RemoteError> {
            Ok(ListingPage::default())
        }
    }

    async fn executor(max_attempts: u32) -> RetryExecutor {
        let handle = ClientHandle::Listing(Arc::new(NoopListing));
        let registry = ClientRegistry::connect(vec![ServiceDeclaration::optional(
            "connect",
            Arc::new(handle),
        )])
        .await
        .unwrap();
        RetryExecutor::new(Arc::new(registry), RetryPolicy::zero_delay(max_attempts))
    }

    fn failure(kind: ErrorKind) -> RemoteError {
        RemoteError::new(kind, "connect", "list_users", "boom")
    }

    #[tokio::test]
    async fn retries_throttling_until_success() {
        let exec = executor(4).await;
        let calls = &AtomicU32::new(0);

        let result = exec
            .call("connect", "list_users", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(failure(ErrorKind::Throttling))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(exec.registry().is_healthy("connect").await);
    }

    #[tokio::test]
    async fn permission_error_is_not_retried() {
        let exec = executor(4).await;
        let calls = &AtomicU32::new(0);

        let err = exec
            .call("connect", "list_users", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(failure(ErrorKind::Permission))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Permission);
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(exec.registry().is_healthy("connect").await);
    }

    #[tokio::test]
    async fn exhaustion_marks_service_unhealthy() {
        let exec = executor(3).await;
        let calls = &AtomicU32::new(0);

        let err = exec
            .call("connect", "list_users", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(failure(ErrorKind::Transient))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!exec.registry().is_healthy("connect").await);

        // a later success restores health
        exec.call("connect", "list_users", || async { Ok(()) })
            .await
            .unwrap();
        assert!(exec.registry().is_healthy("connect").await);
    }

    #[tokio::test]
    async fn unknown_errors_get_half_the_budget() {
        let exec = executor(4).await;
        let calls = &AtomicU32::new(0);

        let err = exec
            .call("connect", "list_users", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(failure(ErrorKind::Unknown))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_transient() {
        let mut exec = executor(2).await;
        exec.policy.call_timeout = Some(Duration::from_millis(10));

        let err = exec
            .call("connect", "list_users", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(err.attempts, 2);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(20), Duration::from_secs(5));
        assert_eq!(policy.attempts_for(ErrorKind::Validation), 1);
        assert_eq!(RetryPolicy::zero_delay(1).attempts_for(ErrorKind::Unknown), 1);
    }
}
