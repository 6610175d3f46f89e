/// Resilience helpers for the newsfeed pipeline
///
/// - **Retry**: exponential backoff with jitter, optionally gated by a
///   "is this error transient?" predicate
/// - **Timeout**: bound a fallible future while keeping its error type
///
/// # Example: retry a broker publish
///
/// ```rust,no_run
/// use resilience::{with_retry, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_retry(RetryConfig::default(), || async {
///         // publish to the broker here
///         Ok::<_, String>(())
///     })
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
