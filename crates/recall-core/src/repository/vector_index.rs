//! Vector Reference Index trait definition.
//!
//! Maps durable message ids to embedding ids assigned by the external vector
//! store, and owns the durable queue of messages still waiting for a link.

use chrono::{DateTime, Utc};
use recall_types::chat::ChatMessage;
use recall_types::embedding::{EmbeddingId, PendingEmbedding};
use recall_types::error::MemoryError;
use uuid::Uuid;

/// Repository trait for message-to-embedding links and pending link tasks.
///
/// May be mutated concurrently by `record_turn` and the reconciliation pass.
pub trait VectorReferenceIndex: Send + Sync {
    /// Link a message to its embedding and drop its pending task.
    ///
    /// Idempotent for the identical id; `Conflict` if a different id is
    /// already linked; `NotFound` if the message does not exist.
    fn link_embedding(
        &self,
        message_id: &Uuid,
        embedding_id: &EmbeddingId,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    fn lookup_embedding(
        &self,
        message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<EmbeddingId>, MemoryError>> + Send;

    /// Non-system messages of a session without a link, oldest first.
    fn unlinked_messages(
        &self,
        session_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, MemoryError>> + Send;

    /// Messages owned by `user_id` that carry any of `embedding_ids`.
    ///
    /// Unknown ids are ignored; order is unspecified.
    fn resolve_embeddings(
        &self,
        user_id: &Uuid,
        embedding_ids: &[EmbeddingId],
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, MemoryError>> + Send;

    /// Claim one pending task if it is due, leasing it until `lease_until`.
    ///
    /// Returns `None` if the task is missing, exhausted, or leased elsewhere.
    fn claim_pending(
        &self,
        message_id: &Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<PendingEmbedding>, MemoryError>> + Send;

    /// Claim up to `limit` due tasks, oldest first, leasing each until `lease_until`.
    fn claim_due_pending(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<PendingEmbedding>, MemoryError>> + Send;

    /// Extend a lease this worker still holds.
    ///
    /// `held_until` is the lease end the worker was granted; if the task was
    /// re-claimed since (or linked, or exhausted) nothing changes and this
    /// returns `false`.
    fn renew_lease(
        &self,
        message_id: &Uuid,
        held_until: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, MemoryError>> + Send;

    fn get_pending(
        &self,
        message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<PendingEmbedding>, MemoryError>> + Send;

    /// Count a failed attempt and schedule the next one. Returns the new attempt count.
    fn record_failure(
        &self,
        message_id: &Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u32, MemoryError>> + Send;

    /// Count a final failed attempt and stop retrying the task.
    fn mark_exhausted(
        &self,
        message_id: &Uuid,
        error: &str,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    /// Tasks that ran out of attempts, oldest first (operator view).
    fn exhausted_pending(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<PendingEmbedding>, MemoryError>> + Send;

    /// Re-arm a task with a fresh attempt budget, due at `at`.
    ///
    /// Creates the task if the message is unlinked and has none; leaves a
    /// live (non-exhausted) task alone. `NotFound` for unknown messages.
    fn requeue(
        &self,
        message_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    /// Number of tasks not yet exhausted.
    fn pending_count(&self) -> impl std::future::Future<Output = Result<u64, MemoryError>> + Send;
}
