/// Integration tests for resilience library
use resilience::{
    presets,
    retry::{with_retry_if, RetryConfig, RetryError},
    timeout::{with_timeout_result, TimeoutError},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
enum CallError {
    Throttled,
    Denied,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Throttled => write!(f, "throttled"),
            CallError::Denied => write!(f, "denied"),
        }
    }
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        jitter: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_timeout_inside_retry_is_retried() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        fast_retry(3),
        move || {
            let attempt = counter_clone.fetch_add(1, Ordering::SeqCst);
            with_timeout_result(Duration::from_millis(20), async move {
                if attempt == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, CallError>("stored")
            })
        },
        |e: &TimeoutError<CallError>| match e {
            TimeoutError::Elapsed(_) => true,
            TimeoutError::OperationFailed(inner) => matches!(inner, CallError::Throttled),
        },
    )
    .await;

    assert_eq!(result.unwrap(), "stored");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fatal_error_is_not_retried_after_transient_ones() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        fast_retry(5),
        move || {
            let attempt = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err::<(), _>(CallError::Throttled)
                } else {
                    Err(CallError::Denied)
                }
            }
        },
        |e: &CallError| matches!(e, CallError::Throttled),
    )
    .await;

    assert!(matches!(result, Err(RetryError::OperationFailed(CallError::Denied))));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_presets_bound_total_attempts() {
    let mut config = presets::cdn_control_config().retry;
    config.initial_backoff = Duration::from_millis(1);
    config.max_backoff = Duration::from_millis(2);
    config.jitter = false;
    let expected_attempts = config.max_retries + 1;

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry_if(
        config,
        move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CallError::Throttled) }
        },
        |_| true,
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts(), expected_attempts);
    assert_eq!(counter.load(Ordering::SeqCst), expected_attempts);
}
