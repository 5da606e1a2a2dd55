//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `recall-core` using sqlx with split read/write pools.
//! Follows the same patterns as `SqliteUserRepository`: raw queries, private Row structs,
//! split reader/writer pool usage.

use chrono::Utc;
use recall_core::repository::chat::ChatRepository;
use recall_types::chat::{
    ChatMessage, ChatSession, MessageDraft, MessagePage, MessageType, MessageWindow,
};
use recall_types::document::Document;
use recall_types::embedding::EmbeddingId;
use recall_types::error::MemoryError;
use recall_types::timestamp::truncate_to_micros;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{
    decode_error, format_datetime, map_sqlx_error, parse_datetime, parse_optional_datetime,
    parse_uuid,
};

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn require_session(&self, session_id: &Uuid) -> Result<(), MemoryError> {
        let exists = sqlx::query("SELECT 1 FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match exists {
            Some(_) => Ok(()),
            None => Err(MemoryError::NotFound(format!("session {session_id}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatSessionRow {
    id: String,
    user_id: String,
    title: Option<String>,
    is_active: bool,
    created_at: String,
    updated_at: String,
    ended_at: Option<String>,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, MemoryError> {
        Ok(ChatSession {
            id: parse_uuid(&self.id, "session id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            title: self.title,
            is_active: self.is_active,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            ended_at: parse_optional_datetime(self.ended_at.as_deref())?,
        })
    }
}

/// Row type shared with the vector reference index, which reads the same table.
pub(crate) struct ChatMessageRow {
    id: String,
    session_id: String,
    user_id: String,
    message_type: String,
    content: String,
    metadata: String,
    created_at: String,
    vector_id: Option<String>,
}

impl ChatMessageRow {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            message_type: row.try_get("message_type")?,
            content: row.try_get("content")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            vector_id: row.try_get("vector_id")?,
        })
    }

    pub(crate) fn into_message(self) -> Result<ChatMessage, MemoryError> {
        let message_type: MessageType = self
            .message_type
            .parse()
            .map_err(|e: MemoryError| MemoryError::Storage(e.to_string()))?;

        Ok(ChatMessage {
            id: parse_uuid(&self.id, "message id")?,
            session_id: parse_uuid(&self.session_id, "session_id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            message_type,
            content: self.content,
            metadata: Document::from_json(&self.metadata)?,
            created_at: parse_datetime(&self.created_at)?,
            vector_id: self.vector_id.map(EmbeddingId),
        })
    }
}

/// Decode a batch of message rows.
pub(crate) fn messages_from_rows(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<ChatMessage>, MemoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let msg_row = ChatMessageRow::from_row(row).map_err(decode_error)?;
        messages.push(msg_row.into_message()?);
    }
    Ok(messages)
}

fn sessions_from_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatSession>, MemoryError> {
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        let session_row = ChatSessionRow::from_row(row).map_err(decode_error)?;
        sessions.push(session_row.into_session()?);
    }
    Ok(sessions)
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_session(
        &self,
        user_id: &Uuid,
        title: Option<String>,
    ) -> Result<ChatSession, MemoryError> {
        let now = truncate_to_micros(Utc::now());
        let session = ChatSession {
            id: Uuid::now_v7(),
            user_id: *user_id,
            title: title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            is_active: true,
            created_at: now,
            updated_at: now,
            ended_at: None,
        };

        let result = sqlx::query(
            r#"INSERT INTO chat_sessions (id, user_id, title, is_active, created_at, updated_at, ended_at)
               VALUES (?, ?, ?, 1, ?, ?, NULL)"#,
        )
        .bind(session.id.to_string())
        .bind(user_id.to_string())
        .bind(&session.title)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error);

        match result {
            Ok(_) => Ok(session),
            Err(MemoryError::NotFound(_)) => Err(MemoryError::NotFound(format!("user {user_id}"))),
            Err(e) => Err(e),
        }
    }

    async fn get_session(&self, session_id: &Uuid) -> Result<Option<ChatSession>, MemoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row).map_err(decode_error)?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn list_sessions(&self, user_id: &Uuid, limit: u32) -> Result<Vec<ChatSession>, MemoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id.to_string())
        .bind(i64::from(limit.clamp(1, MessageWindow::MAX_LIMIT)))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        sessions_from_rows(&rows)
    }

    async fn close_session(&self, session_id: &Uuid) -> Result<ChatSession, MemoryError> {
        let now = format_datetime(&Utc::now());
        let row = sqlx::query(
            r#"UPDATE chat_sessions
               SET is_active = 0, ended_at = ?, updated_at = ?
               WHERE id = ? AND is_active = 1
               RETURNING *"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(session_id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => ChatSessionRow::from_row(&row)
                .map_err(decode_error)?
                .into_session(),
            None => match self.get_session(session_id).await? {
                Some(_) => Err(MemoryError::AlreadyClosed(*session_id)),
                None => Err(MemoryError::NotFound(format!("session {session_id}"))),
            },
        }
    }

    async fn append_message(&self, draft: &MessageDraft) -> Result<ChatMessage, MemoryError> {
        draft.validate()?;
        let metadata_json = draft.metadata.to_json()?;

        // Single writer connection: the ownership checks, the timestamp read,
        // and the inserts below see no interleaved writes.
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_error)?;

        let session_row = sqlx::query("SELECT user_id, is_active FROM chat_sessions WHERE id = ?")
            .bind(draft.session_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| MemoryError::NotFound(format!("session {}", draft.session_id)))?;

        let owner: String = session_row.try_get("user_id").map_err(decode_error)?;
        let is_active: bool = session_row.try_get("is_active").map_err(decode_error)?;

        let user_exists = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(draft.user_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if user_exists.is_none() {
            return Err(MemoryError::NotFound(format!("user {}", draft.user_id)));
        }

        if parse_uuid(&owner, "session owner")? != draft.user_id {
            return Err(MemoryError::Inconsistent(format!(
                "user {} does not own session {}",
                draft.user_id, draft.session_id
            )));
        }

        if !is_active {
            return Err(MemoryError::AlreadyClosed(draft.session_id));
        }

        // Creation times never go backwards within a session, even if the
        // wall clock does.
        let latest: Option<String> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM chat_messages WHERE session_id = ?")
                .bind(draft.session_id.to_string())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let mut created_at = truncate_to_micros(Utc::now());
        if let Some(latest) = latest.as_deref().map(parse_datetime).transpose()? {
            created_at = created_at.max(latest);
        }

        let message = ChatMessage {
            id: Uuid::now_v7(),
            session_id: draft.session_id,
            user_id: draft.user_id,
            message_type: draft.message_type,
            content: draft.content.clone(),
            metadata: draft.metadata.clone(),
            created_at,
            vector_id: None,
        };
        let created_at_str = format_datetime(&created_at);

        sqlx::query(
            r#"INSERT INTO chat_messages (id, session_id, user_id, message_type, content, metadata, created_at, vector_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.user_id.to_string())
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(&metadata_json)
        .bind(&created_at_str)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(&created_at_str)
            .bind(message.session_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if message.message_type.is_embeddable() {
            sqlx::query(
                r#"INSERT INTO pending_embeddings (message_id, session_id, user_id, attempt_count, next_attempt_at, last_error, exhausted, created_at)
                   VALUES (?, ?, ?, 0, ?, NULL, 0, ?)"#,
            )
            .bind(message.id.to_string())
            .bind(message.session_id.to_string())
            .bind(message.user_id.to_string())
            .bind(&created_at_str)
            .bind(&created_at_str)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(message)
    }

    async fn get_message(&self, message_id: &Uuid) -> Result<Option<ChatMessage>, MemoryError> {
        let row = sqlx::query("SELECT * FROM chat_messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(
                ChatMessageRow::from_row(&row).map_err(decode_error)?.into_message()?,
            )),
            None => Ok(None),
        }
    }

    async fn list_messages(
        &self,
        session_id: &Uuid,
        window: &MessageWindow,
    ) -> Result<MessagePage, MemoryError> {
        self.require_session(session_id).await?;
        let limit = window.effective_limit();

        let rows = match &window.after {
            Some(cursor) => {
                let after_ts = format_datetime(&cursor.created_at);
                sqlx::query(
                    r#"SELECT * FROM chat_messages
                       WHERE session_id = ?
                         AND (created_at > ? OR (created_at = ? AND id > ?))
                       ORDER BY created_at ASC, id ASC
                       LIMIT ?"#,
                )
                .bind(session_id.to_string())
                .bind(&after_ts)
                .bind(&after_ts)
                .bind(cursor.id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    r#"SELECT * FROM chat_messages
                       WHERE session_id = ?
                       ORDER BY created_at ASC, id ASC
                       LIMIT ?"#,
                )
                .bind(session_id.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        Ok(MessagePage::from_messages(messages_from_rows(&rows)?, limit))
    }

    async fn recent_messages(&self, session_id: &Uuid, count: u32) -> Result<Vec<ChatMessage>, MemoryError> {
        self.require_session(session_id).await?;

        let rows = sqlx::query(
            r#"SELECT * FROM (
                   SELECT * FROM chat_messages
                   WHERE session_id = ?
                   ORDER BY created_at DESC, id DESC
                   LIMIT ?
               )
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(session_id.to_string())
        .bind(i64::from(count.clamp(1, MessageWindow::MAX_LIMIT)))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        messages_from_rows(&rows)
    }
}
