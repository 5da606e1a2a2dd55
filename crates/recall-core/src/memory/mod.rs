//! Conversational memory: the coordinator that records turns and serves
//! chronological, semantic, and hybrid retrieval, plus the ports it needs
//! from the embedding side.

pub mod coordinator;
pub mod embedder;
pub mod hybrid;
pub mod provider;
pub mod reconcile;

use std::future::Future;
use std::time::Duration;

use recall_types::error::MemoryError;

/// Run `fut` with a deadline. An elapsed deadline is a `Transient` failure.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, MemoryError>>,
) -> Result<T, MemoryError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MemoryError::Transient(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let ok = bounded(Duration::from_secs(1), "op", async { Ok::<_, MemoryError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = bounded(Duration::from_secs(1), "op", async {
            Err::<(), _>(MemoryError::NotFound("x".into()))
        })
        .await;
        assert_eq!(err, Err(MemoryError::NotFound("x".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_timeout_is_transient() {
        let result = bounded(Duration::from_millis(50), "slow op", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, MemoryError>(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow op timed out"));
    }
}
