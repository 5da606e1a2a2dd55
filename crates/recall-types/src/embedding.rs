//! Embedding references and the pending-embedding work queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::ChatMessage;

/// Identifier assigned by the external vector store. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingId(pub String);

impl EmbeddingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmbeddingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmbeddingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What the embedding provider needs to embed and scope one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub message_id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
}

impl EmbeddingRequest {
    pub fn for_message(message: &ChatMessage) -> Self {
        Self {
            message_id: message.id,
            session_id: message.session_id,
            user_id: message.user_id,
            text: message.content.clone(),
        }
    }
}

/// One similarity-search hit. Higher score means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEmbedding {
    pub embedding_id: EmbeddingId,
    pub score: f32,
}

/// A durable task: this message still needs a vector link.
///
/// Created in the same transaction as the message row and removed in the
/// same transaction as the link, so a restart never loses pending work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEmbedding {
    pub message_id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub attempt_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Set once the retry budget is spent; only an operator requeue clears it.
    pub exhausted: bool,
    pub created_at: DateTime<Utc>,
}
