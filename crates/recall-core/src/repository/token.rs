//! Refresh token repository trait definition.

use chrono::{DateTime, Utc};
use recall_types::error::MemoryError;
use recall_types::token::RefreshToken;
use uuid::Uuid;

/// Repository trait for revocable refresh tokens.
///
/// Only token hashes are stored; see [`crate::service::hash::TokenHasher`].
pub trait TokenRepository: Send + Sync {
    /// Store a token hash. `NotFound` if the user does not exist.
    fn create_token(
        &self,
        user_id: &Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<RefreshToken, MemoryError>> + Send;

    fn get_token(
        &self,
        token_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<RefreshToken>, MemoryError>> + Send;

    /// Find the token with this hash, only if it is usable at `now`.
    fn find_usable(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<RefreshToken>, MemoryError>> + Send;

    /// Revoke a token. Idempotent; `NotFound` only for unknown ids.
    fn revoke_token(
        &self,
        token_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    /// Revoke every token of a user. Returns how many were newly revoked.
    fn revoke_all_for_user(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, MemoryError>> + Send;

    /// Revoke tokens with `expires_at < now`. Returns how many were newly revoked.
    ///
    /// Safe to call repeatedly and concurrently.
    fn reap_expired_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, MemoryError>> + Send;
}
