//! Chat session and message types for Recall.
//!
//! A session is one continuous conversation owned by a single user. Messages
//! are totally ordered within a session by `(created_at, id)`.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::embedding::EmbeddingId;
use crate::error::MemoryError;
use crate::timestamp::{format_timestamp, parse_timestamp};

/// Who produced a turn.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (message_type IN ('user', 'assistant', 'system'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Assistant,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::System => "system",
        }
    }

    /// System messages are never embedded.
    pub fn is_embeddable(&self) -> bool {
        !matches!(self, MessageType::System)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageType::User),
            "assistant" => Ok(MessageType::Assistant),
            "system" => Ok(MessageType::System),
            other => Err(MemoryError::InvalidArgument(format!(
                "invalid message type: '{other}' (expected user, assistant, or system)"
            ))),
        }
    }
}

/// One continuous conversation.
///
/// `ended_at` is set at most once, together with `is_active = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One conversational turn.
///
/// `user_id` is a denormalized copy of the session owner for per-user
/// queries; ownership flows through `session_id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Document,
    pub created_at: DateTime<Utc>,
    /// Reference into the external vector store. Immutable once set.
    pub vector_id: Option<EmbeddingId>,
}

/// A message to be appended. The store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Document,
}

impl MessageDraft {
    pub fn new(
        session_id: Uuid,
        user_id: Uuid,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            user_id,
            message_type,
            content: content.into(),
            metadata: Document::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: Document) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reject empty content and invalid metadata.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "message content must not be empty".to_string(),
            ));
        }
        self.metadata.validate()
    }
}

/// Position after which a page of messages starts.
///
/// Serialized as opaque base64url text; callers must not interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl MessageCursor {
    pub fn after(message: &ChatMessage) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id,
        }
    }

    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", format_timestamp(&self.created_at), self.id);
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(token: &str) -> Result<Self, MemoryError> {
        let invalid = || MemoryError::InvalidArgument(format!("invalid cursor: '{token}'"));

        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (ts, id) = raw.split_once('|').ok_or_else(invalid)?;

        Ok(Self {
            created_at: parse_timestamp(ts).map_err(|_| invalid())?,
            id: Uuid::parse_str(id).map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for MessageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Which slice of a session to read.
#[derive(Debug, Clone)]
pub struct MessageWindow {
    pub after: Option<MessageCursor>,
    pub limit: u32,
}

impl MessageWindow {
    /// Upper bound on a single page.
    pub const MAX_LIMIT: u32 = 1000;

    pub fn first(limit: u32) -> Self {
        Self { after: None, limit }
    }

    pub fn after(cursor: MessageCursor, limit: u32) -> Self {
        Self {
            after: Some(cursor),
            limit,
        }
    }

    /// Limit clamped into `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

/// A page of messages plus the cursor to continue from.
///
/// `next_cursor` is `None` once the page came back shorter than requested.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    #[serde(serialize_with = "serialize_cursor")]
    pub next_cursor: Option<MessageCursor>,
}

impl MessagePage {
    pub fn from_messages(messages: Vec<ChatMessage>, limit: u32) -> Self {
        let next_cursor = if messages.len() as u32 >= limit {
            messages.last().map(MessageCursor::after)
        } else {
            None
        };
        Self {
            messages,
            next_cursor,
        }
    }
}

fn serialize_cursor<S: serde::Serializer>(
    cursor: &Option<MessageCursor>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match cursor {
        Some(cursor) => serializer.serialize_some(&cursor.encode()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_message(created_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            message_type: MessageType::User,
            content: "hello".to_string(),
            metadata: Document::default(),
            created_at,
            vector_id: None,
        }
    }

    #[test]
    fn test_message_type_parse_and_display() {
        for ty in [MessageType::User, MessageType::Assistant, MessageType::System] {
            let parsed: MessageType = ty.to_string().parse().unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn test_message_type_rejects_outside_closed_set() {
        for raw in ["tool", "USER", "", "function"] {
            let err = raw.parse::<MessageType>().unwrap_err();
            assert!(matches!(err, MemoryError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_message_type_serde() {
        let json = serde_json::to_string(&MessageType::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_system_messages_not_embeddable() {
        assert!(MessageType::User.is_embeddable());
        assert!(MessageType::Assistant.is_embeddable());
        assert!(!MessageType::System.is_embeddable());
    }

    #[test]
    fn test_draft_rejects_blank_content() {
        let draft = MessageDraft::new(Uuid::now_v7(), Uuid::now_v7(), MessageType::User, "  \n");
        assert!(matches!(draft.validate(), Err(MemoryError::InvalidArgument(_))));
    }

    #[test]
    fn test_cursor_encode_decode() {
        let message = make_message(crate::timestamp::truncate_to_micros(Utc::now()));
        let cursor = MessageCursor::after(&message);
        let decoded = MessageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_cursor_decode_garbage() {
        assert!(MessageCursor::decode("not a cursor!").is_err());
        let no_separator = URL_SAFE_NO_PAD.encode(b"2026-01-01T00:00:00Z");
        assert!(MessageCursor::decode(&no_separator).is_err());
    }

    #[test]
    fn test_window_limit_clamped() {
        assert_eq!(MessageWindow::first(0).effective_limit(), 1);
        assert_eq!(MessageWindow::first(5000).effective_limit(), MessageWindow::MAX_LIMIT);
    }

    #[test]
    fn test_page_cursor_only_when_full() {
        let now = Utc::now();
        let full = MessagePage::from_messages(vec![make_message(now), make_message(now)], 2);
        assert!(full.next_cursor.is_some());

        let short = MessagePage::from_messages(vec![make_message(now)], 2);
        assert!(short.next_cursor.is_none());
    }
}
