//! Embedding Provider port.
//!
//! The external service that computes embeddings, stores them in its own
//! identifier space, and answers similarity searches. Every failure of this
//! collaborator is treated as `Transient` by the coordinator.

use recall_types::embedding::{EmbeddingId, EmbeddingRequest, ScoredEmbedding};
use recall_types::error::MemoryError;
use uuid::Uuid;

pub trait EmbeddingProvider: Send + Sync {
    /// Embed the request text and return the id the vector store assigned.
    fn embed(
        &self,
        request: &EmbeddingRequest,
    ) -> impl std::future::Future<Output = Result<EmbeddingId, MemoryError>> + Send;

    /// The `top_k` nearest embeddings owned by `user_id`, most similar first.
    fn similarity_search(
        &self,
        user_id: &Uuid,
        query_embedding: &[f32],
        top_k: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ScoredEmbedding>, MemoryError>> + Send;

    /// Do any one-time setup (model load) ahead of the first request.
    fn warm(&self) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send {
        async { Ok(()) }
    }
}
