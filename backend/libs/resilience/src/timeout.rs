/// Timeout wrapper that keeps the wrapped operation's error type
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error("{0}")]
    Inner(E),
}

/// Execute a fallible future, failing with `Elapsed` if it outlives `duration`
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Elapsed(duration)),
    }
}
