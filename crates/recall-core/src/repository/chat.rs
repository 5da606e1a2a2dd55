//! ChatRepository trait definition.
//!
//! Sessions and messages. Follows the same RPITIT pattern as the other
//! repositories in this module.

use recall_types::chat::{ChatMessage, ChatSession, MessageDraft, MessagePage, MessageWindow};
use recall_types::error::MemoryError;
use uuid::Uuid;

/// Repository trait for chat session and message persistence.
///
/// Implementations live in recall-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Open a new active session. `NotFound` if the user does not exist.
    fn create_session(
        &self,
        user_id: &Uuid,
        title: Option<String>,
    ) -> impl std::future::Future<Output = Result<ChatSession, MemoryError>> + Send;

    fn get_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, MemoryError>> + Send;

    /// List a user's sessions, newest first.
    fn list_sessions(
        &self,
        user_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, MemoryError>> + Send;

    /// Mark the session inactive and stamp `ended_at`.
    ///
    /// Strict: a second call fails with `AlreadyClosed`.
    fn close_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<ChatSession, MemoryError>> + Send;

    /// Append a message.
    ///
    /// - `NotFound` if the session or user does not exist.
    /// - `InvalidArgument` for empty content or invalid metadata.
    /// - `Inconsistent` if the session owner is not `draft.user_id`.
    /// - `AlreadyClosed` if the session has ended.
    ///
    /// The stored `created_at` is never earlier than the latest message
    /// already in the session. Embeddable messages get a pending embedding
    /// task in the same transaction.
    fn append_message(
        &self,
        draft: &MessageDraft,
    ) -> impl std::future::Future<Output = Result<ChatMessage, MemoryError>> + Send;

    fn get_message(
        &self,
        message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, MemoryError>> + Send;

    /// Page through a session ordered by `(created_at, id)` ascending.
    ///
    /// `NotFound` if the session does not exist.
    fn list_messages(
        &self,
        session_id: &Uuid,
        window: &MessageWindow,
    ) -> impl std::future::Future<Output = Result<MessagePage, MemoryError>> + Send;

    /// The last `count` messages of a session, returned oldest first.
    fn recent_messages(
        &self,
        session_id: &Uuid,
        count: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, MemoryError>> + Send;
}
