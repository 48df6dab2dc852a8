/// Resilience patterns for release pipeline network calls
///
/// This library provides the two guards every remote call in the pipeline goes through:
/// - **Retry**: Bounded exponential backoff with jitter, applied only to errors the caller
///   classifies as transient
/// - **Timeout**: Enforces time limits on a single attempt
/// - **Preset Configurations**: Pre-tuned settings for object storage and CDN control-plane calls
///
/// # Example: Object upload with retry
///
/// ```rust,no_run
/// use resilience::{presets, with_retry_if};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::object_storage_config();
///
///     let result = with_retry_if(
///         config.retry,
///         || async {
///             // Your PUT call here
///             Ok::<_, String>(())
///         },
///         |err: &String| err.contains("SlowDown"),
///     )
///     .await;
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use presets::{cdn_control_config, object_storage_config, ServiceConfig};
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
