//! SQLite user and profile repository implementation.
//!
//! Implements `UserRepository` from `recall-core` using sqlx with split
//! read/write pools, raw queries, and private Row structs.

use chrono::{DateTime, Utc};
use recall_core::repository::user::UserRepository;
use recall_types::document::Document;
use recall_types::error::MemoryError;
use recall_types::timestamp::truncate_to_micros;
use recall_types::user::{NewUser, ProfileUpdate, User, UserProfile, normalize_email, normalize_username};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{
    decode_error, format_datetime, map_sqlx_error, parse_datetime, parse_optional_datetime,
    parse_uuid,
};

/// SQLite-backed implementation of `UserRepository`.
pub struct SqliteUserRepository {
    pool: DatabasePool,
}

impl SqliteUserRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_user(&self, column: &str, value: String) -> Result<Option<User>, MemoryError> {
        let sql = format!("SELECT * FROM users WHERE {column} = ?");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(UserRow::from_row(&row).map_err(decode_error)?.into_user()?)),
            None => Ok(None),
        }
    }

    async fn fetch_profile(&self, user_id: &Uuid) -> Result<Option<UserProfile>, MemoryError> {
        let row = sqlx::query("SELECT * FROM user_profiles WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(
                ProfileRow::from_row(&row).map_err(decode_error)?.into_profile()?,
            )),
            None => Ok(None),
        }
    }

    async fn update_flag(&self, user_id: &Uuid, sql: &str, value: bool) -> Result<(), MemoryError> {
        let now = format_datetime(&Utc::now());
        let result = sqlx::query(sql)
            .bind(value)
            .bind(&now)
            .bind(user_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct UserRow {
    id: String,
    email: String,
    username: String,
    credential_hash: String,
    full_name: Option<String>,
    is_active: bool,
    is_verified: bool,
    created_at: String,
    updated_at: String,
    last_login_at: Option<String>,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            credential_hash: row.try_get("credential_hash")?,
            full_name: row.try_get("full_name")?,
            is_active: row.try_get("is_active")?,
            is_verified: row.try_get("is_verified")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_login_at: row.try_get("last_login_at")?,
        })
    }

    fn into_user(self) -> Result<User, MemoryError> {
        Ok(User {
            id: parse_uuid(&self.id, "user id")?,
            email: self.email,
            username: self.username,
            credential_hash: self.credential_hash,
            full_name: self.full_name,
            is_active: self.is_active,
            is_verified: self.is_verified,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            last_login_at: parse_optional_datetime(self.last_login_at.as_deref())?,
        })
    }
}

struct ProfileRow {
    id: String,
    user_id: String,
    avatar_url: Option<String>,
    bio: Option<String>,
    preferences: String,
    settings: String,
    timezone: String,
    language: String,
    created_at: String,
    updated_at: String,
}

impl ProfileRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            avatar_url: row.try_get("avatar_url")?,
            bio: row.try_get("bio")?,
            preferences: row.try_get("preferences")?,
            settings: row.try_get("settings")?,
            timezone: row.try_get("timezone")?,
            language: row.try_get("language")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_profile(self) -> Result<UserProfile, MemoryError> {
        Ok(UserProfile {
            id: parse_uuid(&self.id, "profile id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            avatar_url: self.avatar_url,
            bio: self.bio,
            preferences: Document::from_json(&self.preferences)?,
            settings: Document::from_json(&self.settings)?,
            timezone: self.timezone,
            language: self.language,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

async fn insert_profile<'e, E>(executor: E, profile: &UserProfile) -> Result<(), MemoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO user_profiles (id, user_id, avatar_url, bio, preferences, settings, timezone, language, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(profile.id.to_string())
    .bind(profile.user_id.to_string())
    .bind(&profile.avatar_url)
    .bind(&profile.bio)
    .bind(profile.preferences.to_json()?)
    .bind(profile.settings.to_json()?)
    .bind(&profile.timezone)
    .bind(&profile.language)
    .bind(format_datetime(&profile.created_at))
    .bind(format_datetime(&profile.updated_at))
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// UserRepository implementation
// ---------------------------------------------------------------------------

impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, MemoryError> {
        let new_user = new_user.normalized()?;
        let now = truncate_to_micros(Utc::now());
        let user = User {
            id: Uuid::now_v7(),
            email: new_user.email,
            username: new_user.username,
            credential_hash: new_user.credential_hash,
            full_name: new_user.full_name,
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        // Use a transaction: INSERT user + INSERT default profile
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"INSERT INTO users (id, email, username, credential_hash, full_name, is_active, is_verified, created_at, updated_at, last_login_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.credential_hash)
        .bind(&user.full_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(format_datetime(&user.created_at))
        .bind(format_datetime(&user.updated_at))
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                let field = if db_err.message().contains("email") {
                    format!("email '{}'", user.email)
                } else {
                    format!("username '{}'", user.username)
                };
                return Err(MemoryError::Conflict(format!("{field} already exists")));
            }
            Err(e) => return Err(map_sqlx_error(e)),
        }

        insert_profile(&mut *tx, &UserProfile::default_for(user.id, now)).await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    async fn get_user(&self, user_id: &Uuid) -> Result<Option<User>, MemoryError> {
        self.fetch_one_user("id", user_id.to_string()).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, MemoryError> {
        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => return Ok(None),
        };
        self.fetch_one_user("email", email).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, MemoryError> {
        let username = match normalize_username(username) {
            Ok(username) => username,
            Err(_) => return Ok(None),
        };
        self.fetch_one_user("username", username).await
    }

    async fn set_active(&self, user_id: &Uuid, active: bool) -> Result<(), MemoryError> {
        self.update_flag(
            user_id,
            "UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?",
            active,
        )
        .await
    }

    async fn mark_verified(&self, user_id: &Uuid) -> Result<(), MemoryError> {
        self.update_flag(
            user_id,
            "UPDATE users SET is_verified = ?, updated_at = ? WHERE id = ?",
            true,
        )
        .await
    }

    async fn record_login(&self, user_id: &Uuid, at: DateTime<Utc>) -> Result<(), MemoryError> {
        let at = format_datetime(&at);
        let result =
            sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
                .bind(&at)
                .bind(&at)
                .bind(user_id.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &Uuid) -> Result<(), MemoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(format!("user {user_id}")));
        }

        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    async fn get_profile(&self, user_id: &Uuid) -> Result<UserProfile, MemoryError> {
        if let Some(profile) = self.fetch_profile(user_id).await? {
            return Ok(profile);
        }

        // Lazily create the default profile. A concurrent creator wins the
        // UNIQUE(user_id) race, so fall through and re-read on conflict.
        let profile = UserProfile::default_for(*user_id, truncate_to_micros(Utc::now()));
        match insert_profile(&self.pool.writer, &profile).await {
            Ok(()) => Ok(profile),
            Err(MemoryError::Conflict(_)) => self
                .fetch_profile(user_id)
                .await?
                .ok_or_else(|| MemoryError::NotFound(format!("profile for user {user_id}"))),
            Err(MemoryError::NotFound(_)) => Err(MemoryError::NotFound(format!("user {user_id}"))),
            Err(e) => Err(e),
        }
    }

    async fn update_profile(
        &self,
        user_id: &Uuid,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, MemoryError> {
        update.validate()?;
        let mut profile = self.get_profile(user_id).await?;
        profile.apply(update, truncate_to_micros(Utc::now()))?;

        let result = sqlx::query(
            r#"UPDATE user_profiles
               SET avatar_url = ?, bio = ?, preferences = ?, settings = ?, timezone = ?, language = ?, updated_at = ?
               WHERE user_id = ?"#,
        )
        .bind(&profile.avatar_url)
        .bind(&profile.bio)
        .bind(profile.preferences.to_json()?)
        .bind(profile.settings.to_json()?)
        .bind(&profile.timezone)
        .bind(&profile.language)
        .bind(format_datetime(&profile.updated_at))
        .bind(user_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(format!("profile for user {user_id}")));
        }

        Ok(profile)
    }
}
