//! User and profile repository trait definition.

use chrono::{DateTime, Utc};
use recall_types::error::MemoryError;
use recall_types::user::{NewUser, ProfileUpdate, User, UserProfile};
use uuid::Uuid;

/// Repository trait for users and their 1:1 profiles.
///
/// The implementation enforces email/username uniqueness and cascades user
/// deletion to every owned row.
pub trait UserRepository: Send + Sync {
    /// Register a user and create the default profile in one transaction.
    ///
    /// Returns `Conflict` if the email or username is already taken.
    fn create_user(
        &self,
        new_user: &NewUser,
    ) -> impl std::future::Future<Output = Result<User, MemoryError>> + Send;

    fn get_user(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<User>, MemoryError>> + Send;

    /// Look up by email (case-insensitive).
    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, MemoryError>> + Send;

    /// Look up by username (case-insensitive).
    fn get_user_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, MemoryError>> + Send;

    /// Soft-enable or soft-disable a user.
    fn set_active(
        &self,
        user_id: &Uuid,
        active: bool,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    fn mark_verified(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    fn record_login(
        &self,
        user_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    /// Delete a user and, by cascade, their profile, sessions, messages,
    /// tokens, and pending embedding tasks.
    fn delete_user(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), MemoryError>> + Send;

    /// Get the user's profile, creating the default one if it is missing.
    fn get_profile(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<UserProfile, MemoryError>> + Send;

    fn update_profile(
        &self,
        user_id: &Uuid,
        update: &ProfileUpdate,
    ) -> impl std::future::Future<Output = Result<UserProfile, MemoryError>> + Send;
}
