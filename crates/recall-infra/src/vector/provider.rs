//! LanceDB-backed embedding provider.
//!
//! Vectorizes message text with an `Embedder`, stores one row per message in
//! the `message_embeddings` table, and answers cosine similarity searches
//! scoped to a single user. The relational store only ever sees the
//! `embedding_id` this module hands back.

use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field};
use chrono::Utc;
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use recall_core::memory::embedder::Embedder;
use recall_core::memory::provider::EmbeddingProvider;
use recall_types::embedding::{EmbeddingId, EmbeddingRequest, ScoredEmbedding};
use recall_types::error::MemoryError;
use recall_types::timestamp::format_timestamp;
use tracing::{debug, info};
use uuid::Uuid;

use super::lance::LanceVectorStore;
use super::schema::{EMBEDDING_DIMENSION, message_embeddings_schema};

fn provider_error(what: &str, e: impl std::fmt::Display) -> MemoryError {
    MemoryError::Transient(format!("{what}: {e}"))
}

/// Embedding provider over a local LanceDB directory.
pub struct LanceEmbeddingProvider<E: Embedder> {
    store: LanceVectorStore,
    embedder: E,
}

impl<E: Embedder> LanceEmbeddingProvider<E> {
    pub fn new(store: LanceVectorStore, embedder: E) -> Self {
        Self { store, embedder }
    }

    async fn table(&self) -> Result<lancedb::Table, MemoryError> {
        self.store
            .embeddings_table()
            .await
            .map_err(|e| provider_error("failed to open embeddings table", e))
    }

    async fn vectorize(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let vector = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Transient("embedder returned no vector".to_string()))?;

        if vector.len() != EMBEDDING_DIMENSION as usize {
            return Err(MemoryError::InvalidArgument(format!(
                "embedding has {} dimensions, expected {EMBEDDING_DIMENSION}",
                vector.len()
            )));
        }
        Ok(vector)
    }

    /// Turn free text into a query vector for semantic retrieval.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        if text.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("query text is empty".to_string()));
        }
        self.vectorize(text).await
    }

    fn build_record_batch(
        embedding_id: &str,
        request: &EmbeddingRequest,
        model: &str,
        vector: Vec<f32>,
    ) -> Result<RecordBatch, MemoryError> {
        let values = Float32Array::from(vector);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(field, EMBEDDING_DIMENSION, Arc::new(values), None);

        RecordBatch::try_new(
            Arc::new(message_embeddings_schema()),
            vec![
                Arc::new(StringArray::from(vec![embedding_id.to_string()])),
                Arc::new(StringArray::from(vec![request.message_id.to_string()])),
                Arc::new(StringArray::from(vec![request.user_id.to_string()])),
                Arc::new(StringArray::from(vec![request.session_id.to_string()])),
                Arc::new(StringArray::from(vec![format_timestamp(&Utc::now())])),
                Arc::new(StringArray::from(vec![model.to_string()])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| provider_error("failed to build record batch", e))
    }

    /// Number of stored vectors.
    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| provider_error("failed to count embeddings", e))
    }

    /// Remove every vector owned by a user.
    pub async fn purge_user(&self, user_id: &Uuid) -> Result<(), MemoryError> {
        purge_user_embeddings(&self.store, user_id).await
    }
}

/// Remove every vector owned by a user. Called after the user's relational
/// rows are deleted; needs only the store, not a loaded embedding model.
pub async fn purge_user_embeddings(store: &LanceVectorStore, user_id: &Uuid) -> Result<(), MemoryError> {
    let Some(table) = store
        .existing_embeddings_table()
        .await
        .map_err(|e| provider_error("failed to open embeddings table", e))?
    else {
        return Ok(());
    };

    table
        .delete(&format!("user_id = '{user_id}'"))
        .await
        .map_err(|e| provider_error("failed to purge user embeddings", e))?;

    info!(user_id = %user_id, "User embeddings purged");
    Ok(())
}

impl<E: Embedder> EmbeddingProvider for LanceEmbeddingProvider<E> {
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingId, MemoryError> {
        let vector = self.vectorize(&request.text).await?;
        // One row per message: a retry replaces the row and returns the same id.
        let embedding_id = request.message_id.to_string();

        let batch =
            Self::build_record_batch(&embedding_id, request, self.embedder.model_name(), vector)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = self.table().await?;
        table
            .delete(&format!("message_id = '{}'", request.message_id))
            .await
            .map_err(|e| provider_error("failed to replace embedding", e))?;
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| provider_error("failed to store embedding", e))?;

        debug!(message_id = %request.message_id, embedding_id = %embedding_id, "Embedding stored");
        Ok(EmbeddingId::new(embedding_id))
    }

    async fn similarity_search(
        &self,
        user_id: &Uuid,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredEmbedding>, MemoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.len() != EMBEDDING_DIMENSION as usize {
            return Err(MemoryError::InvalidArgument(format!(
                "query embedding has {} dimensions, expected {EMBEDDING_DIMENSION}",
                query_embedding.len()
            )));
        }

        let results = self
            .table()
            .await?
            .vector_search(query_embedding)
            .map_err(|e| provider_error("vector search setup failed", e))?
            .distance_type(lancedb::DistanceType::Cosine)
            .only_if(format!("user_id = '{user_id}'"))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| provider_error("vector search failed", e))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| provider_error("failed to collect search results", e))?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = batch
                .column_by_name("embedding_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            // The _distance column is added by LanceDB vector search
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            let (Some(ids), Some(distances)) = (ids, distances) else {
                continue;
            };

            for i in 0..batch.num_rows() {
                if ids.is_null(i) {
                    continue;
                }
                hits.push(ScoredEmbedding {
                    embedding_id: EmbeddingId::new(ids.value(i)),
                    score: 1.0 - distances.value(i),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic embedder: each text hashes to a direction on the unit
    /// sphere, so identical texts score 1.0 against each other.
    struct SeededEmbedder;

    fn seeded_vector(seed: f32) -> Vec<f32> {
        let mut vec = vec![0.0_f32; EMBEDDING_DIMENSION as usize];
        for (i, val) in vec.iter_mut().enumerate() {
            *val = ((i as f32 + seed) * 0.01).sin();
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        for val in vec.iter_mut() {
            *val /= norm;
        }
        vec
    }

    fn seed_for(text: &str) -> f32 {
        text.bytes().map(f32::from).sum()
    }

    impl Embedder for SeededEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
            Ok(texts.iter().map(|t| seeded_vector(seed_for(t))).collect())
        }

        fn model_name(&self) -> &str {
            "seeded-test"
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIMENSION as usize
        }
    }

    async fn setup() -> (LanceEmbeddingProvider<SeededEmbedder>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = LanceVectorStore::new(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to create LanceVectorStore");
        (LanceEmbeddingProvider::new(store, SeededEmbedder), temp_dir)
    }

    fn request(user_id: Uuid, text: &str) -> EmbeddingRequest {
        EmbeddingRequest {
            message_id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            user_id,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_embed_assigns_distinct_ids_per_message() {
        let (provider, _tmp) = setup().await;
        let user = Uuid::now_v7();

        let a = provider.embed(&request(user, "hello")).await.unwrap();
        let b = provider.embed(&request(user, "hello")).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(provider.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_re_embedding_a_message_replaces_its_vector() {
        let (provider, _tmp) = setup().await;
        let user = Uuid::now_v7();
        let req = request(user, "retry me");

        let first = provider.embed(&req).await.unwrap();
        let second = provider.embed(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.count().await.unwrap(), 1);

        let query = provider.embed_query("retry me").await.unwrap();
        let hits = provider.similarity_search(&user, &query, 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].embedding_id, first);
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_user_and_sorted() {
        let (provider, _tmp) = setup().await;
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();

        let exact = provider.embed(&request(alice, "rust ownership")).await.unwrap();
        provider.embed(&request(alice, "gardening tips")).await.unwrap();
        let bobs = provider.embed(&request(bob, "rust ownership")).await.unwrap();

        let query = provider.embed_query("rust ownership").await.unwrap();
        let hits = provider.similarity_search(&alice, &query, 10).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].embedding_id, exact);
        assert!((hits[0].score - 1.0).abs() < 1e-3);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.embedding_id != bobs));
    }

    #[tokio::test]
    async fn test_search_respects_top_k() {
        let (provider, _tmp) = setup().await;
        let user = Uuid::now_v7();
        for text in ["one", "two", "three", "four"] {
            provider.embed(&request(user, text)).await.unwrap();
        }

        let query = provider.embed_query("two").await.unwrap();
        assert_eq!(provider.similarity_search(&user, &query, 2).await.unwrap().len(), 2);
        assert!(provider.similarity_search(&user, &query, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_dimension() {
        let (provider, _tmp) = setup().await;
        let err = provider
            .similarity_search(&Uuid::now_v7(), &[0.5, 0.5], 3)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_purge_user_removes_only_their_vectors() {
        let (provider, _tmp) = setup().await;
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        provider.embed(&request(alice, "a1")).await.unwrap();
        provider.embed(&request(alice, "a2")).await.unwrap();
        provider.embed(&request(bob, "b1")).await.unwrap();

        provider.purge_user(&alice).await.unwrap();

        assert_eq!(provider.count().await.unwrap(), 1);
        let query = provider.embed_query("a1").await.unwrap();
        assert!(provider.similarity_search(&alice, &query, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_text_rejected() {
        let (provider, _tmp) = setup().await;
        let err = provider.embed_query("   ").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
    }
}
