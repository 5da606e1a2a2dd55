//! Embedding linkage and the reconciliation pass.
//!
//! `EmbeddingLinker` performs one attempt for one message: ask the provider
//! for an embedding, link it, and on failure either schedule the next
//! attempt with exponential backoff or mark the task exhausted. Both the
//! inline attempt spawned by `record_turn` and the background reconciler go
//! through it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use recall_types::config::{MemoryConfig, ReconcileConfig};
use recall_types::embedding::EmbeddingRequest;
use recall_types::error::MemoryError;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::bounded;
use super::provider::EmbeddingProvider;
use crate::repository::vector_index::VectorReferenceIndex;

/// Delay before attempt number `attempt + 1`, given `attempt` failures so far.
///
/// `base * 2^(attempt - 1)`, capped at `max`.
pub fn backoff_delay(config: &ReconcileConfig, attempt: u32) -> Duration {
    let base = config.base_backoff();
    let max = config.max_backoff();
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
}

/// Result of a single linkage attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// Failed; another attempt is scheduled.
    Retrying { attempts: u32 },
    /// Failed for the last time; the message stays unlinked.
    Exhausted { attempts: u32 },
    /// Nothing left to do (message deleted, or linked by someone else).
    Dropped,
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub attempted: u32,
    pub linked: u32,
    pub failed: u32,
    pub exhausted: u32,
    pub dropped: u32,
}

impl ReconcileReport {
    pub(crate) fn record(&mut self, outcome: &LinkOutcome) {
        self.attempted += 1;
        match outcome {
            LinkOutcome::Linked => self.linked += 1,
            LinkOutcome::Retrying { .. } => self.failed += 1,
            LinkOutcome::Exhausted { .. } => self.exhausted += 1,
            LinkOutcome::Dropped => self.dropped += 1,
        }
    }
}

/// One-message embed-and-link worker, shared by inline and background paths.
pub struct EmbeddingLinker<V, P> {
    index: Arc<V>,
    provider: Arc<P>,
    config: MemoryConfig,
}

impl<V, P> Clone for EmbeddingLinker<V, P> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
        }
    }
}

impl<V: VectorReferenceIndex, P: EmbeddingProvider> EmbeddingLinker<V, P> {
    pub fn new(index: Arc<V>, provider: Arc<P>, config: MemoryConfig) -> Self {
        Self {
            index,
            provider,
            config,
        }
    }

    /// How long a claimed task stays leased to the worker that claimed it.
    pub fn lease(&self) -> chrono::Duration {
        let span = self.config.embed_timeout() + self.config.store_timeout() * 2;
        chrono::Duration::from_std(span).unwrap_or_else(|_| chrono::Duration::minutes(5))
    }

    /// Embed and link one message. `prior_attempts` is the task's attempt count.
    pub async fn attempt(&self, request: &EmbeddingRequest, prior_attempts: u32) -> LinkOutcome {
        let message_id = request.message_id;

        let failure = match bounded(
            self.config.embed_timeout(),
            "embedding request",
            self.provider.embed(request),
        )
        .await
        {
            Ok(embedding_id) => {
                match bounded(
                    self.config.store_timeout(),
                    "embedding link",
                    self.index.link_embedding(&message_id, &embedding_id),
                )
                .await
                {
                    Ok(()) => {
                        debug!(message_id = %message_id, embedding_id = %embedding_id, "Embedding linked");
                        return LinkOutcome::Linked;
                    }
                    Err(MemoryError::Conflict(reason)) => {
                        error!(message_id = %message_id, embedding_id = %embedding_id, %reason, "Message already linked to a different embedding");
                        return LinkOutcome::Dropped;
                    }
                    Err(MemoryError::NotFound(_)) => {
                        debug!(message_id = %message_id, "Message deleted before its embedding was linked");
                        return LinkOutcome::Dropped;
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        self.record_failure(&request.message_id, prior_attempts, &failure)
            .await
    }

    async fn record_failure(
        &self,
        message_id: &uuid::Uuid,
        prior_attempts: u32,
        failure: &MemoryError,
    ) -> LinkOutcome {
        let attempts = prior_attempts + 1;
        let reason = failure.to_string();

        if attempts >= self.config.reconcile.max_attempts {
            warn!(
                message_id = %message_id,
                attempts,
                error = %reason,
                "Embedding retries exhausted; message left unlinked"
            );
            if let Err(e) = bounded(
                self.config.store_timeout(),
                "mark exhausted",
                self.index.mark_exhausted(message_id, &reason),
            )
            .await
            {
                warn!(message_id = %message_id, error = %e, "Failed to mark embedding task exhausted");
            }
            return LinkOutcome::Exhausted { attempts };
        }

        let next_attempt_at = next_attempt_at(&self.config.reconcile, attempts, Utc::now());
        warn!(
            message_id = %message_id,
            attempts,
            error_kind = failure.kind(),
            error = %reason,
            next_attempt_at = %next_attempt_at,
            "Embedding attempt failed; will retry"
        );

        // If this write fails the lease simply expires and the task is retried.
        if let Err(e) = bounded(
            self.config.store_timeout(),
            "record failure",
            self.index.record_failure(message_id, &reason, next_attempt_at),
        )
        .await
        {
            warn!(message_id = %message_id, error = %e, "Failed to record embedding failure");
        }

        LinkOutcome::Retrying { attempts }
    }
}

fn next_attempt_at(config: &ReconcileConfig, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(backoff_delay(config, attempts))
        .unwrap_or_else(|_| chrono::Duration::milliseconds(config.max_backoff_ms as i64));
    now + delay
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_ms: u64, max_ms: u64) -> ReconcileConfig {
        ReconcileConfig {
            base_backoff_ms: base_ms,
            max_backoff_ms: max_ms,
            ..ReconcileConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let cfg = config(100, 10_000);
        assert_eq!(backoff_delay(&cfg, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&cfg, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&cfg, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&cfg, 5), Duration::from_millis(1_600));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let cfg = config(1_000, 5_000);
        assert_eq!(backoff_delay(&cfg, 4), Duration::from_millis(5_000));
        assert_eq!(backoff_delay(&cfg, 40), Duration::from_millis(5_000));
        assert_eq!(backoff_delay(&cfg, u32::MAX), Duration::from_millis(5_000));
    }

    #[test]
    fn test_backoff_zero_attempts_is_base() {
        let cfg = config(250, 1_000);
        assert_eq!(backoff_delay(&cfg, 0), Duration::from_millis(250));
    }

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = ReconcileReport::default();
        report.record(&LinkOutcome::Linked);
        report.record(&LinkOutcome::Retrying { attempts: 1 });
        report.record(&LinkOutcome::Exhausted { attempts: 5 });
        report.record(&LinkOutcome::Dropped);
        assert_eq!(
            report,
            ReconcileReport {
                attempted: 4,
                linked: 1,
                failed: 1,
                exhausted: 1,
                dropped: 1,
            }
        );
    }

    #[test]
    fn test_next_attempt_in_future() {
        let cfg = config(1_000, 60_000);
        let now = Utc::now();
        assert_eq!(
            next_attempt_at(&cfg, 2, now),
            now + chrono::Duration::milliseconds(2_000)
        );
    }
}
