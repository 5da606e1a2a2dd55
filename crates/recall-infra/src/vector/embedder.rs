//! FastEmbed-based local embedding generator.
//!
//! Implements the `Embedder` trait from `recall-core` using fastembed's
//! BGESmallENV15 model (384 dimensions) with ONNX runtime inference.
//! Inference is CPU-bound, so it runs on tokio's blocking pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use recall_core::memory::embedder::Embedder;
use recall_types::error::MemoryError;
use tracing::{debug, info};

use super::schema::EMBEDDING_DIMENSION;

/// Model name recorded next to every stored vector.
pub const FASTEMBED_MODEL_NAME: &str = "bge-small-en-v1.5";

/// Local ONNX embedder.
///
/// The model is loaded once and shared; calls are serialized on a mutex.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    /// Load (downloading on first use) the model into `cache_dir`.
    pub async fn new(cache_dir: PathBuf) -> Result<Self, MemoryError> {
        info!(cache_dir = %cache_dir.display(), model = FASTEMBED_MODEL_NAME, "Loading embedding model");

        let model = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(
                TextInitOptions::new(EmbeddingModel::BGESmallENV15)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false),
            )
        })
        .await
        .map_err(|e| MemoryError::Transient(format!("embedding model loader panicked: {e}")))?
        .map_err(|e| MemoryError::Transient(format!("failed to load embedding model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let count = texts.len();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| MemoryError::Transient("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| MemoryError::Transient(format!("embedding failed: {e}")))
        })
        .await
        .map_err(|e| MemoryError::Transient(format!("embedding task panicked: {e}")))??;

        debug!(count, "Texts embedded");
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        FASTEMBED_MODEL_NAME
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION as usize
    }
}
