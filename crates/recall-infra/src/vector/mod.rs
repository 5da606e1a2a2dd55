//! Vector database infrastructure for message embeddings.
//!
//! Provides LanceDB vector store management, fastembed-based local
//! embedding generation, and the `EmbeddingProvider` that ties the two
//! together. Arrow schemas define the table structures.

pub mod embedder;
pub mod lance;
pub mod provider;
pub mod schema;
