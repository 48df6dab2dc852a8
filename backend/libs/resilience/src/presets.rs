/// Preset configurations for the remote calls made during a release
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a remote dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: RetryConfig,
}

/// S3/Object storage operations (list, put, delete, version reads)
///
/// - Timeout: 120s per attempt (large static assets)
/// - Retry: 5 retries, 500ms doubling up to 30s
pub fn object_storage_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(120),
        },
        retry: RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}

/// CDN control-plane calls (create/get invalidation)
///
/// - Timeout: 30s per attempt
/// - Retry: 3 retries, 1s doubling up to 20s (invalidation APIs throttle aggressively)
pub fn cdn_control_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(30),
        },
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(20),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}
