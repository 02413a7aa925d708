use std::future::Future;

use crate::config::RetryPolicy;
use crate::message::MessageResponse;

/// Result of one delivery attempt.
pub(crate) enum Attempt {
    /// Final: success or a failure that retrying cannot fix.
    Done(MessageResponse),
    /// Transient failure; kept as the result if no attempts remain.
    Retry(MessageResponse),
}

/// Run `attempt` until it is done or the policy is exhausted, sleeping a fixed
/// delay between attempts.
pub(crate) async fn with_retry<F, Fut>(policy: RetryPolicy, transport: &str, mut attempt: F) -> MessageResponse
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    let attempts = policy.attempts();
    let mut number = 1;
    loop {
        match attempt(number).await {
            Attempt::Done(response) => return response,
            Attempt::Retry(response) if number >= attempts => return response,
            Attempt::Retry(response) => {
                tracing::warn!(
                    transport,
                    attempt = number,
                    max_attempts = attempts,
                    error_code = response.error_code().unwrap_or_default(),
                    "Transient send failure, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
                number += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let response = with_retry(policy(3), "test", move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Attempt::Retry(MessageResponse::failure("SERVER_ERROR", "503"))
                } else {
                    Attempt::Done(MessageResponse::success(None))
                }
            }
        })
        .await;
        assert!(response.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_failure_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let response = with_retry(policy(2), "test", move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Attempt::Retry(MessageResponse::failure("TIMEOUT", format!("attempt {n}"))) }
        })
        .await;
        assert_eq!(response.error_message(), Some("attempt 3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_done_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let response = with_retry(policy(5), "test", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Done(MessageResponse::failure("AUTHENTICATION_FAILED", "401")) }
        })
        .await;
        assert_eq!(response.error_code(), Some("AUTHENTICATION_FAILED"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
