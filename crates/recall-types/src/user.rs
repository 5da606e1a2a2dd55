//! User identity and profile types.
//!
//! A `User` is the root of ownership: profile, sessions, messages, and
//! refresh tokens are all removed when the user is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::error::MemoryError;

/// Default profile timezone for newly registered users.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Default profile language for newly registered users.
pub const DEFAULT_LANGUAGE: &str = "en";

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 50;

/// A registered user.
///
/// `credential_hash` is produced by the auth collaborator and is opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Input for user registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub credential_hash: String,
    pub full_name: Option<String>,
}

impl NewUser {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        credential_hash: impl Into<String>,
        full_name: Option<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            credential_hash: credential_hash.into(),
            full_name,
        }
    }

    /// Lowercase email and username, then validate every field.
    pub fn normalized(&self) -> Result<NewUser, MemoryError> {
        let email = normalize_email(&self.email)?;
        let username = normalize_username(&self.username)?;

        if self.credential_hash.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "credential hash must not be empty".to_string(),
            ));
        }

        let full_name = self
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(NewUser {
            email,
            username,
            credential_hash: self.credential_hash.clone(),
            full_name,
        })
    }
}

/// Lowercase and validate an email address (one `@`, non-empty local and domain parts).
pub fn normalize_email(email: &str) -> Result<String, MemoryError> {
    let email = email.trim().to_lowercase();
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        _ => false,
    };
    if !valid {
        return Err(MemoryError::InvalidArgument(format!(
            "invalid email address: '{email}'"
        )));
    }
    Ok(email)
}

/// Lowercase and validate a username: 3-50 chars of ASCII alphanumerics, `_`, `-`.
pub fn normalize_username(username: &str) -> Result<String, MemoryError> {
    let username = username.trim().to_lowercase();
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(MemoryError::InvalidArgument(format!(
            "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MemoryError::InvalidArgument(format!(
            "username '{username}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(username)
}

/// Per-user preferences, settings, and locale. 1:1 with [`User`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub preferences: Document,
    pub settings: Document,
    pub timezone: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// The profile every user starts with.
    pub fn default_for(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            avatar_url: None,
            bio: None,
            preferences: Document::default(),
            settings: Document::default(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields present in `update`, leaving the rest untouched.
    pub fn apply(&mut self, update: &ProfileUpdate, now: DateTime<Utc>) -> Result<(), MemoryError> {
        update.validate()?;
        if let Some(avatar_url) = &update.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        if let Some(bio) = &update.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(preferences) = &update.preferences {
            self.preferences = preferences.clone();
        }
        if let Some(settings) = &update.settings {
            self.settings = settings.clone();
        }
        if let Some(timezone) = &update.timezone {
            self.timezone = timezone.clone();
        }
        if let Some(language) = &update.language {
            self.language = language.clone();
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub preferences: Option<Document>,
    pub settings: Option<Document>,
    pub timezone: Option<String>,
    pub language: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), MemoryError> {
        if let Some(preferences) = &self.preferences {
            preferences.validate()?;
        }
        if let Some(settings) = &self.settings {
            settings.validate()?;
        }
        if matches!(&self.timezone, Some(tz) if tz.trim().is_empty()) {
            return Err(MemoryError::InvalidArgument(
                "timezone must not be empty".to_string(),
            ));
        }
        if matches!(&self.language, Some(lang) if lang.trim().is_empty()) {
            return Err(MemoryError::InvalidArgument(
                "language must not be empty".to_string(),
            ));
        }
        if matches!(&self.bio, Some(bio) if bio.chars().count() > 500) {
            return Err(MemoryError::InvalidArgument(
                "bio must be at most 500 characters".to_string(),
            ));
        }
        Ok(())
    }
}
