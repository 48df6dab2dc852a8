//! Retry and timeout guards shared by every remote call

use crate::services::invalidator::InvalidationError;
use resilience::{with_retry_if, with_timeout_result, RetryError, ServiceConfig, TimeoutError};
use s3_utils::StorageError;
use std::future::Future;
use std::time::Duration;

/// Run `op` with a per-attempt timeout, retrying only errors `retryable` accepts
///
/// An elapsed attempt is turned into an error by `elapsed` and goes through the
/// same retry decision as any other failure.
async fn guarded<F, Fut, T, E, R, L>(
    config: &ServiceConfig,
    mut op: F,
    retryable: R,
    elapsed: L,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
    L: Fn(Duration) -> E,
{
    let limit = config.timeout.duration;
    let elapsed = &elapsed;

    with_retry_if(
        config.retry.clone(),
        || {
            let attempt = op();
            async move {
                match with_timeout_result(limit, attempt).await {
                    Ok(value) => Ok(value),
                    Err(TimeoutError::OperationFailed(e)) => Err(e),
                    Err(TimeoutError::Elapsed(after)) => Err(elapsed(after)),
                }
            }
        },
        retryable,
    )
    .await
}

pub(crate) async fn call_storage<F, Fut, T>(
    config: &ServiceConfig,
    action: &str,
    resource: &str,
    op: F,
) -> Result<T, RetryError<StorageError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    guarded(config, op, StorageError::is_retryable, |after| {
        StorageError::transient(action, resource, format!("timed out after {:?}", after))
    })
    .await
}

pub(crate) async fn call_edge<F, Fut, T>(
    config: &ServiceConfig,
    action: &str,
    op: F,
) -> Result<T, RetryError<InvalidationError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InvalidationError>>,
{
    guarded(config, op, InvalidationError::is_retryable, |after| {
        InvalidationError::Transient {
            action: action.to_string(),
            message: format!("timed out after {:?}", after),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::{RetryConfig, TimeoutConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> ServiceConfig {
        ServiceConfig {
            timeout: TimeoutConfig {
                duration: Duration::from_millis(50),
            },
            retry: RetryConfig {
                max_retries,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        }
    }

    #[tokio::test]
    async fn test_transient_storage_error_is_retried() {
        let calls = AtomicU32::new(0);
        let result = call_storage(&fast(3), "s3:PutObject", "site/a.css", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StorageError::transient("s3:PutObject", "site/a.css", "reset"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_denied_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_storage(&fast(3), "s3:PutObject", "site/a.css", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::AccessDenied {
                action: "s3:PutObject".to_string(),
                resource: "site/a.css".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(RetryError::OperationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_elapsed_attempt_becomes_transient() {
        let result: Result<(), _> = call_edge(&fast(1), "cloudfront:CreateInvalidation", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(RetryError::MaxRetriesExceeded { last_error, .. }) => {
                assert!(last_error.is_retryable())
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
