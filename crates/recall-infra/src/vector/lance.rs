//! LanceDB connection holding the `message_embeddings` table.

use std::path::PathBuf;
use std::sync::Arc;

use super::schema::{MESSAGE_EMBEDDINGS_TABLE, message_embeddings_schema};

/// A LanceDB directory, by default `{data_dir}/vector_store`.
pub struct LanceVectorStore {
    db: lancedb::Connection,
}

impl LanceVectorStore {
    /// Connect to the store at `path`, creating the directory if needed.
    pub async fn new(path: PathBuf) -> Result<Self, lancedb::Error> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| lancedb::Error::CreateDir {
                path: path.display().to_string(),
                source: e,
            })?;

        let uri = path.to_str().ok_or_else(|| lancedb::Error::InvalidInput {
            message: format!("vector store path is not UTF-8: {}", path.display()),
        })?;

        let db = lancedb::connect(uri).execute().await?;
        Ok(Self { db })
    }

    /// Open the embeddings table, creating it empty on first use.
    pub async fn embeddings_table(&self) -> Result<lancedb::Table, lancedb::Error> {
        match self.existing_embeddings_table().await? {
            Some(table) => Ok(table),
            None => {
                self.db
                    .create_empty_table(MESSAGE_EMBEDDINGS_TABLE, Arc::new(message_embeddings_schema()))
                    .execute()
                    .await
            }
        }
    }

    /// The embeddings table, or `None` if nothing was ever embedded here.
    pub async fn existing_embeddings_table(&self) -> Result<Option<lancedb::Table>, lancedb::Error> {
        match self.db.open_table(MESSAGE_EMBEDDINGS_TABLE).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
