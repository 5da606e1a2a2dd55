//! SQLite vector reference index.
//!
//! Links live in `chat_messages.vector_id`; the durable queue of messages
//! still waiting for a link lives in `pending_embeddings`. Linking a message
//! and dropping its pending task happen in one transaction.

use chrono::{DateTime, Utc};
use recall_core::repository::vector_index::VectorReferenceIndex;
use recall_types::chat::{ChatMessage, MessageType};
use recall_types::embedding::{EmbeddingId, PendingEmbedding};
use recall_types::error::MemoryError;
use sqlx::Row;
use uuid::Uuid;

use super::chat::messages_from_rows;
use super::pool::DatabasePool;
use super::{decode_error, format_datetime, map_sqlx_error, parse_datetime, parse_uuid};

/// Maximum bound parameters per `IN (...)` query.
const RESOLVE_CHUNK: usize = 500;

/// SQLite-backed implementation of `VectorReferenceIndex`.
pub struct SqliteVectorIndex {
    pool: DatabasePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct PendingRow {
    message_id: String,
    session_id: String,
    user_id: String,
    attempt_count: i64,
    next_attempt_at: String,
    last_error: Option<String>,
    exhausted: bool,
    created_at: String,
}

impl PendingRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            message_id: row.try_get("message_id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            attempt_count: row.try_get("attempt_count")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            last_error: row.try_get("last_error")?,
            exhausted: row.try_get("exhausted")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_pending(self) -> Result<PendingEmbedding, MemoryError> {
        Ok(PendingEmbedding {
            message_id: parse_uuid(&self.message_id, "message_id")?,
            session_id: parse_uuid(&self.session_id, "session_id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            attempt_count: self.attempt_count.max(0) as u32,
            next_attempt_at: parse_datetime(&self.next_attempt_at)?,
            last_error: self.last_error,
            exhausted: self.exhausted,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn pending_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<PendingEmbedding>, MemoryError> {
    let mut pending = Vec::with_capacity(rows.len());
    for row in rows {
        pending.push(PendingRow::from_row(row).map_err(decode_error)?.into_pending()?);
    }
    Ok(pending)
}

impl VectorReferenceIndex for SqliteVectorIndex {
    async fn link_embedding(
        &self,
        message_id: &Uuid,
        embedding_id: &EmbeddingId,
    ) -> Result<(), MemoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT vector_id FROM chat_messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| MemoryError::NotFound(format!("message {message_id}")))?;

        let existing: Option<String> = row.try_get("vector_id").map_err(decode_error)?;
        match existing {
            Some(existing) if existing == embedding_id.as_str() => {}
            Some(existing) => {
                return Err(MemoryError::Conflict(format!(
                    "message {message_id} is already linked to embedding {existing}"
                )));
            }
            None => {
                let result = sqlx::query(
                    "UPDATE chat_messages SET vector_id = ? WHERE id = ? AND vector_id IS NULL",
                )
                .bind(embedding_id.as_str())
                .bind(message_id.to_string())
                .execute(&mut *tx)
                .await;

                match result {
                    Ok(_) => {}
                    Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                        return Err(MemoryError::Conflict(format!(
                            "embedding {embedding_id} is already linked to another message"
                        )));
                    }
                    Err(e) => return Err(map_sqlx_error(e)),
                }
            }
        }

        sqlx::query("DELETE FROM pending_embeddings WHERE message_id = ?")
            .bind(message_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn lookup_embedding(&self, message_id: &Uuid) -> Result<Option<EmbeddingId>, MemoryError> {
        let vector_id: Option<Option<String>> =
            sqlx::query_scalar("SELECT vector_id FROM chat_messages WHERE id = ?")
                .bind(message_id.to_string())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(map_sqlx_error)?;

        Ok(vector_id.flatten().map(EmbeddingId))
    }

    async fn unlinked_messages(&self, session_id: &Uuid, limit: u32) -> Result<Vec<ChatMessage>, MemoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM chat_messages
               WHERE session_id = ? AND vector_id IS NULL AND message_type != 'system'
               ORDER BY created_at ASC, id ASC
               LIMIT ?"#,
        )
        .bind(session_id.to_string())
        .bind(i64::from(limit.max(1)))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        messages_from_rows(&rows)
    }

    async fn resolve_embeddings(
        &self,
        user_id: &Uuid,
        embedding_ids: &[EmbeddingId],
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let mut messages = Vec::with_capacity(embedding_ids.len());

        for chunk in embedding_ids.chunks(RESOLVE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT * FROM chat_messages WHERE user_id = ? AND vector_id IN ({placeholders})"
            );

            let mut query = sqlx::query(&sql).bind(user_id.to_string());
            for id in chunk {
                query = query.bind(id.as_str());
            }

            let rows = query
                .fetch_all(&self.pool.reader)
                .await
                .map_err(map_sqlx_error)?;
            messages.extend(messages_from_rows(&rows)?);
        }

        Ok(messages)
    }

    async fn claim_pending(
        &self,
        message_id: &Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<PendingEmbedding>, MemoryError> {
        let row = sqlx::query(
            r#"UPDATE pending_embeddings
               SET next_attempt_at = ?
               WHERE message_id = ? AND exhausted = 0 AND next_attempt_at <= ?
               RETURNING *"#,
        )
        .bind(format_datetime(&lease_until))
        .bind(message_id.to_string())
        .bind(format_datetime(&now))
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(PendingRow::from_row(&row).map_err(decode_error)?.into_pending()?)),
            None => Ok(None),
        }
    }

    async fn claim_due_pending(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PendingEmbedding>, MemoryError> {
        let rows = sqlx::query(
            r#"UPDATE pending_embeddings
               SET next_attempt_at = ?
               WHERE message_id IN (
                   SELECT message_id FROM pending_embeddings
                   WHERE exhausted = 0 AND next_attempt_at <= ?
                   ORDER BY next_attempt_at ASC, message_id ASC
                   LIMIT ?
               )
               RETURNING *"#,
        )
        .bind(format_datetime(&lease_until))
        .bind(format_datetime(&now))
        .bind(i64::from(limit.max(1)))
        .fetch_all(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        // RETURNING order is unspecified.
        let mut claimed = pending_from_rows(&rows)?;
        claimed.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        Ok(claimed)
    }

    async fn renew_lease(
        &self,
        message_id: &Uuid,
        held_until: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, MemoryError> {
        let result = sqlx::query(
            r#"UPDATE pending_embeddings
               SET next_attempt_at = ?
               WHERE message_id = ? AND exhausted = 0 AND next_attempt_at = ?"#,
        )
        .bind(format_datetime(&lease_until))
        .bind(message_id.to_string())
        .bind(format_datetime(&held_until))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_pending(&self, message_id: &Uuid) -> Result<Option<PendingEmbedding>, MemoryError> {
        let row = sqlx::query("SELECT * FROM pending_embeddings WHERE message_id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(PendingRow::from_row(&row).map_err(decode_error)?.into_pending()?)),
            None => Ok(None),
        }
    }

    async fn record_failure(
        &self,
        message_id: &Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<u32, MemoryError> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"UPDATE pending_embeddings
               SET attempt_count = attempt_count + 1, last_error = ?, next_attempt_at = ?
               WHERE message_id = ?
               RETURNING attempt_count"#,
        )
        .bind(error)
        .bind(format_datetime(&next_attempt_at))
        .bind(message_id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        attempts
            .map(|n| n.max(0) as u32)
            .ok_or_else(|| MemoryError::NotFound(format!("pending embedding for message {message_id}")))
    }

    async fn mark_exhausted(&self, message_id: &Uuid, error: &str) -> Result<(), MemoryError> {
        let result = sqlx::query(
            r#"UPDATE pending_embeddings
               SET attempt_count = attempt_count + 1, last_error = ?, exhausted = 1
               WHERE message_id = ?"#,
        )
        .bind(error)
        .bind(message_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(format!(
                "pending embedding for message {message_id}"
            )));
        }
        Ok(())
    }

    async fn exhausted_pending(&self, limit: u32) -> Result<Vec<PendingEmbedding>, MemoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM pending_embeddings
               WHERE exhausted = 1
               ORDER BY created_at ASC, message_id ASC
               LIMIT ?"#,
        )
        .bind(i64::from(limit.max(1)))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        pending_from_rows(&rows)
    }

    async fn requeue(&self, message_id: &Uuid, at: DateTime<Utc>) -> Result<(), MemoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(
            "SELECT session_id, user_id, message_type, created_at, vector_id FROM chat_messages WHERE id = ?",
        )
        .bind(message_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| MemoryError::NotFound(format!("message {message_id}")))?;

        let vector_id: Option<String> = row.try_get("vector_id").map_err(decode_error)?;
        if vector_id.is_some() {
            return Ok(());
        }

        let message_type: String = row.try_get("message_type").map_err(decode_error)?;
        if !message_type
            .parse::<MessageType>()
            .map_err(|e| MemoryError::Storage(e.to_string()))?
            .is_embeddable()
        {
            return Err(MemoryError::InvalidArgument(format!(
                "message {message_id} is a system message and is never embedded"
            )));
        }

        let session_id: String = row.try_get("session_id").map_err(decode_error)?;
        let user_id: String = row.try_get("user_id").map_err(decode_error)?;
        let created_at: String = row.try_get("created_at").map_err(decode_error)?;

        sqlx::query(
            r#"INSERT INTO pending_embeddings (message_id, session_id, user_id, attempt_count, next_attempt_at, last_error, exhausted, created_at)
               VALUES (?, ?, ?, 0, ?, NULL, 0, ?)
               ON CONFLICT(message_id) DO UPDATE
               SET attempt_count = 0, last_error = NULL, exhausted = 0,
                   next_attempt_at = excluded.next_attempt_at
               WHERE pending_embeddings.exhausted = 1"#,
        )
        .bind(message_id.to_string())
        .bind(&session_id)
        .bind(&user_id)
        .bind(format_datetime(&at))
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<u64, MemoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_embeddings WHERE exhausted = 0")
                .fetch_one(&self.pool.reader)
                .await
                .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }
}
