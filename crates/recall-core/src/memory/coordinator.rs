//! Memory coordinator.
//!
//! Sequences writes across the relational store and the embedding provider
//! and serves the three retrieval modes. A recorded turn is durable and
//! returned before its embedding exists; linkage happens on a tracked
//! background task and, failing that, in the reconciliation pass.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use recall_types::chat::{ChatMessage, ChatSession, MessageDraft, MessagePage, MessageType, MessageWindow};
use recall_types::config::MemoryConfig;
use recall_types::document::Document;
use recall_types::embedding::{EmbeddingId, EmbeddingRequest};
use recall_types::error::MemoryError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bounded;
use super::hybrid::merge_hybrid;
use super::provider::EmbeddingProvider;
use super::reconcile::{EmbeddingLinker, LinkOutcome, ReconcileReport};
use crate::repository::chat::ChatRepository;
use crate::repository::vector_index::VectorReferenceIndex;

/// Orchestrates the relational store, the vector reference index, and the
/// embedding provider.
///
/// Generic over the repository and provider ports so that recall-core never
/// depends on recall-infra.
pub struct MemoryCoordinator<C, V, P> {
    chat: Arc<C>,
    index: Arc<V>,
    provider: Arc<P>,
    linker: EmbeddingLinker<V, P>,
    config: MemoryConfig,
    tasks: TaskTracker,
}

impl<C, V, P> MemoryCoordinator<C, V, P>
where
    C: ChatRepository + 'static,
    V: VectorReferenceIndex + 'static,
    P: EmbeddingProvider + 'static,
{
    pub fn new(chat: Arc<C>, index: Arc<V>, provider: Arc<P>, config: MemoryConfig) -> Self {
        let config = config.sanitized();
        let linker = EmbeddingLinker::new(Arc::clone(&index), Arc::clone(&provider), config.clone());
        Self {
            chat,
            index,
            provider,
            linker,
            config,
            tasks: TaskTracker::new(),
        }
    }

    pub async fn open_session(
        &self,
        user_id: &Uuid,
        title: Option<String>,
    ) -> Result<ChatSession, MemoryError> {
        let session = bounded(
            self.config.store_timeout(),
            "create session",
            self.chat.create_session(user_id, title),
        )
        .await?;
        info!(session_id = %session.id, user_id = %user_id, "Session opened");
        Ok(session)
    }

    pub async fn close_session(&self, session_id: &Uuid) -> Result<ChatSession, MemoryError> {
        let session = bounded(
            self.config.store_timeout(),
            "close session",
            self.chat.close_session(session_id),
        )
        .await?;
        info!(session_id = %session_id, "Session closed");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &Uuid) -> Result<Option<ChatSession>, MemoryError> {
        bounded(
            self.config.store_timeout(),
            "get session",
            self.chat.get_session(session_id),
        )
        .await
    }

    /// Append a turn and, for non-system turns, start embedding it.
    ///
    /// Returns as soon as the message row is committed. Store failures are
    /// surfaced; embedding failures never are.
    pub async fn record_turn(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        message_type: MessageType,
        content: impl Into<String>,
        metadata: Option<Document>,
    ) -> Result<ChatMessage, MemoryError> {
        let mut draft = MessageDraft::new(session_id, user_id, message_type, content);
        if let Some(metadata) = metadata {
            draft = draft.with_metadata(metadata);
        }

        let message = bounded(
            self.config.store_timeout(),
            "append message",
            self.chat.append_message(&draft),
        )
        .await?;

        debug!(
            message_id = %message.id,
            session_id = %session_id,
            message_type = %message_type,
            "Turn recorded"
        );

        if message_type.is_embeddable() {
            self.spawn_embedding(&message);
        }

        Ok(message)
    }

    fn spawn_embedding(&self, message: &ChatMessage) {
        let linker = self.linker.clone();
        let index = Arc::clone(&self.index);
        let store_timeout = self.config.store_timeout();
        let request = EmbeddingRequest::for_message(message);

        self.tasks.spawn(async move {
            let now = Utc::now();
            let claimed = bounded(
                store_timeout,
                "claim pending embedding",
                index.claim_pending(&request.message_id, now, now + linker.lease()),
            )
            .await;

            match claimed {
                Ok(Some(task)) => {
                    linker.attempt(&request, task.attempt_count).await;
                }
                Ok(None) => {
                    debug!(message_id = %request.message_id, "Embedding task already claimed");
                }
                Err(e) => {
                    // The durable task stays due; the reconciler will pick it up.
                    warn!(message_id = %request.message_id, error = %e, "Failed to claim embedding task");
                }
            }
        });
    }

    /// Prepare the provider outside the per-call embed timeout.
    pub async fn warm_provider(&self) -> Result<(), MemoryError> {
        self.provider.warm().await?;
        debug!("Embedding provider ready");
        Ok(())
    }

    /// Wait for every in-flight embedding task spawned by `record_turn`.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Number of embedding tasks still running in this process.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Page through a session in `(created_at, id)` order.
    pub async fn retrieve_chronological(
        &self,
        session_id: &Uuid,
        window: &MessageWindow,
    ) -> Result<MessagePage, MemoryError> {
        bounded(
            self.config.store_timeout(),
            "list messages",
            self.chat.list_messages(session_id, window),
        )
        .await
    }

    /// The `top_k` messages of `user_id` closest to `query_embedding`,
    /// most similar first.
    ///
    /// Hits whose message no longer exists (or is no longer linked) are
    /// skipped, so the result may be shorter than `top_k`.
    pub async fn retrieve_semantic(
        &self,
        user_id: &Uuid,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let hits = bounded(
            self.config.search_timeout(),
            "similarity search",
            self.provider.similarity_search(user_id, query_embedding, top_k),
        )
        .await?;

        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<EmbeddingId> = hits.iter().map(|hit| hit.embedding_id.clone()).collect();
        let resolved = bounded(
            self.config.store_timeout(),
            "resolve embeddings",
            self.index.resolve_embeddings(user_id, &ids),
        )
        .await?;

        let mut by_embedding: HashMap<EmbeddingId, ChatMessage> = resolved
            .into_iter()
            .filter_map(|message| message.vector_id.clone().map(|id| (id, message)))
            .collect();

        let mut ordered = Vec::with_capacity(hits.len());
        for hit in &hits {
            match by_embedding.remove(&hit.embedding_id) {
                Some(message) => ordered.push(message),
                None => debug!(embedding_id = %hit.embedding_id, "Skipping unresolvable search hit"),
            }
        }

        Ok(ordered)
    }

    /// The last `recent_n` turns of the session followed by up to
    /// `semantic_k` semantic matches from anywhere in the owner's history.
    pub async fn retrieve_hybrid(
        &self,
        session_id: &Uuid,
        query_embedding: &[f32],
        recent_n: u32,
        semantic_k: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("session {session_id}")))?;

        let recent = if recent_n == 0 {
            Vec::new()
        } else {
            bounded(
                self.config.store_timeout(),
                "recent messages",
                self.chat.recent_messages(session_id, recent_n),
            )
            .await?
        };

        let semantic = self
            .retrieve_semantic(&session.user_id, query_embedding, semantic_k)
            .await?;

        Ok(merge_hybrid(recent, semantic))
    }

    /// One pass over due embedding tasks.
    ///
    /// The batch is claimed with a single-attempt lease; each task's lease is
    /// renewed just before it is worked on, and tasks another worker has
    /// taken over in the meantime are skipped.
    pub async fn reconcile_once(&self, now: chrono::DateTime<Utc>) -> Result<ReconcileReport, MemoryError> {
        let lease = self.linker.lease();
        let started = tokio::time::Instant::now();
        let due = bounded(
            self.config.store_timeout(),
            "claim due embeddings",
            self.index
                .claim_due_pending(now, now + lease, self.config.reconcile.batch_size),
        )
        .await?;

        let mut report = ReconcileReport::default();
        for task in due {
            let elapsed = chrono::Duration::from_std(started.elapsed()).unwrap_or(lease);
            let renewed = bounded(
                self.config.store_timeout(),
                "renew embedding lease",
                self.index
                    .renew_lease(&task.message_id, task.next_attempt_at, now + elapsed + lease),
            )
            .await;
            match renewed {
                Ok(true) => {}
                Ok(false) => {
                    debug!(message_id = %task.message_id, "Embedding lease taken over; skipping");
                    continue;
                }
                Err(e) => {
                    warn!(message_id = %task.message_id, error = %e, "Failed to renew embedding lease");
                    continue;
                }
            }

            let message = match bounded(
                self.config.store_timeout(),
                "get message",
                self.chat.get_message(&task.message_id),
            )
            .await
            {
                Ok(Some(message)) => message,
                Ok(None) => {
                    report.record(&LinkOutcome::Dropped);
                    continue;
                }
                Err(e) => {
                    // Lease expires and the task comes back next pass.
                    warn!(message_id = %task.message_id, error = %e, "Failed to load message for embedding");
                    continue;
                }
            };

            let request = EmbeddingRequest::for_message(&message);
            let outcome = self.linker.attempt(&request, task.attempt_count).await;
            report.record(&outcome);
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                linked = report.linked,
                failed = report.failed,
                exhausted = report.exhausted,
                "Reconciliation pass complete"
            );
        }

        Ok(report)
    }

    /// Re-arm and attempt every unlinked message of one session, up to `limit`.
    ///
    /// Exhausted tasks get a fresh attempt budget; tasks currently leased by
    /// another worker are left to that worker.
    pub async fn backfill_session(
        &self,
        session_id: &Uuid,
        limit: u32,
    ) -> Result<ReconcileReport, MemoryError> {
        let unlinked = bounded(
            self.config.store_timeout(),
            "unlinked messages",
            self.index.unlinked_messages(session_id, limit),
        )
        .await?;

        let mut report = ReconcileReport::default();
        for message in unlinked {
            let now = Utc::now();
            bounded(
                self.config.store_timeout(),
                "requeue embedding",
                self.index.requeue(&message.id, now),
            )
            .await?;

            let claimed = bounded(
                self.config.store_timeout(),
                "claim pending embedding",
                self.index
                    .claim_pending(&message.id, now, now + self.linker.lease()),
            )
            .await?;

            if let Some(task) = claimed {
                let request = EmbeddingRequest::for_message(&message);
                let outcome = self.linker.attempt(&request, task.attempt_count).await;
                report.record(&outcome);
            }
        }

        info!(
            session_id = %session_id,
            attempted = report.attempted,
            linked = report.linked,
            "Session backfill complete"
        );
        Ok(report)
    }

    /// Run reconciliation passes every `reconcile.interval` until cancelled.
    pub async fn run_reconciler(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.reconcile.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.reconcile.interval_secs,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.reconcile_once(Utc::now()).await {
                warn!(error = %e, error_kind = e.kind(), "Reconciliation pass failed");
            }
        }

        info!("Reconciler stopped");
    }
}
