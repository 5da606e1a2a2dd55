//! Application state wiring the store, the embedding provider, and the
//! coordinator together.
//!
//! The coordinator is generic over repository and provider ports; AppState
//! pins it to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use recall_core::memory::coordinator::MemoryCoordinator;
use recall_core::memory::provider::EmbeddingProvider;
use recall_core::service::token::TokenService;
use recall_infra::config::{
    default_database_url, load_memory_config, model_cache_path, resolve_data_dir,
    vector_store_path,
};
use recall_infra::crypto::hash::Sha256TokenHasher;
use recall_infra::sqlite::chat::SqliteChatRepository;
use recall_infra::sqlite::pool::DatabasePool;
use recall_infra::sqlite::token::SqliteTokenRepository;
use recall_infra::sqlite::user::SqliteUserRepository;
use recall_infra::sqlite::vector_index::SqliteVectorIndex;
use recall_infra::vector::embedder::FastEmbedder;
use recall_infra::vector::lance::LanceVectorStore;
use recall_infra::vector::provider::LanceEmbeddingProvider;
use recall_types::config::MemoryConfig;
use recall_types::embedding::{EmbeddingId, EmbeddingRequest, ScoredEmbedding};
use recall_types::error::MemoryError;
use tokio::sync::OnceCell;
use uuid::Uuid;

pub type ConcreteProvider = LanceEmbeddingProvider<FastEmbedder>;

pub type ConcreteCoordinator =
    MemoryCoordinator<SqliteChatRepository, SqliteVectorIndex, LocalProvider>;

pub type ConcreteTokenService = TokenService<SqliteTokenRepository, Sha256TokenHasher>;

/// The local LanceDB + fastembed provider, loaded on first use.
///
/// Loading the model is slow (and downloads it the first time), so commands
/// that never embed anything never pay for it.
pub struct LocalProvider {
    data_dir: PathBuf,
    inner: OnceCell<ConcreteProvider>,
}

impl LocalProvider {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            inner: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&ConcreteProvider, MemoryError> {
        self.inner
            .get_or_try_init(|| async {
                let store = LanceVectorStore::new(vector_store_path(&self.data_dir))
                    .await
                    .map_err(|e| MemoryError::Transient(format!("failed to open vector store: {e}")))?;
                let embedder = FastEmbedder::new(model_cache_path(&self.data_dir)).await?;
                Ok(LanceEmbeddingProvider::new(store, embedder))
            })
            .await
    }

    /// Embed free query text with the same model used for stored turns.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.get().await?.embed_query(text).await
    }
}

impl EmbeddingProvider for LocalProvider {
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingId, MemoryError> {
        self.get().await?.embed(request).await
    }

    async fn similarity_search(
        &self,
        user_id: &Uuid,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredEmbedding>, MemoryError> {
        self.get()
            .await?
            .similarity_search(user_id, query_embedding, top_k)
            .await
    }

    /// Loads (or downloads) the model.
    async fn warm(&self) -> Result<(), MemoryError> {
        self.get().await.map(|_| ())
    }
}

/// Shared application state used by every command.
pub struct AppState {
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub config: MemoryConfig,
    pub users: Arc<SqliteUserRepository>,
    pub chat: Arc<SqliteChatRepository>,
    pub index: Arc<SqliteVectorIndex>,
    pub provider: Arc<LocalProvider>,
    pub coordinator: Arc<ConcreteCoordinator>,
    pub token_service: Arc<ConcreteTokenService>,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire the coordinator.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_memory_config(&data_dir).await;
        let db_pool = DatabasePool::new(&default_database_url(&data_dir)).await?;

        let users = Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let chat = Arc::new(SqliteChatRepository::new(db_pool.clone()));
        let index = Arc::new(SqliteVectorIndex::new(db_pool.clone()));
        let provider = Arc::new(LocalProvider::new(data_dir.clone()));

        let coordinator = Arc::new(MemoryCoordinator::new(
            Arc::clone(&chat),
            Arc::clone(&index),
            Arc::clone(&provider),
            config.clone(),
        ));

        let token_service = Arc::new(TokenService::new(
            SqliteTokenRepository::new(db_pool.clone()),
            Sha256TokenHasher::new(),
        ));

        tracing::debug!(data_dir = %data_dir.display(), "Application state initialized");

        Ok(Self {
            data_dir,
            db_pool,
            config,
            users,
            chat,
            index,
            provider,
            coordinator,
            token_service,
        })
    }

    /// Wait for in-flight embeddings, then close the pool.
    pub async fn shutdown(&self) {
        self.coordinator.drain().await;
        self.db_pool.close().await;
    }
}
