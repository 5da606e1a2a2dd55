//! SQLite refresh token repository implementation.

use chrono::{DateTime, Utc};
use recall_core::repository::token::TokenRepository;
use recall_types::error::MemoryError;
use recall_types::timestamp::truncate_to_micros;
use recall_types::token::RefreshToken;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{decode_error, format_datetime, map_sqlx_error, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `TokenRepository`.
pub struct SqliteTokenRepository {
    pool: DatabasePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct TokenRow {
    id: String,
    user_id: String,
    token_hash: String,
    expires_at: String,
    revoked: bool,
    created_at: String,
    updated_at: String,
}

impl TokenRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token_hash: row.try_get("token_hash")?,
            expires_at: row.try_get("expires_at")?,
            revoked: row.try_get("revoked")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_token(self) -> Result<RefreshToken, MemoryError> {
        Ok(RefreshToken {
            id: parse_uuid(&self.id, "token id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            token_hash: self.token_hash,
            expires_at: parse_datetime(&self.expires_at)?,
            revoked: self.revoked,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl TokenRepository for SqliteTokenRepository {
    async fn create_token(
        &self,
        user_id: &Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, MemoryError> {
        let now = truncate_to_micros(Utc::now());
        let token = RefreshToken {
            id: Uuid::now_v7(),
            user_id: *user_id,
            token_hash: token_hash.to_string(),
            expires_at: truncate_to_micros(expires_at),
            revoked: false,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            r#"INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked, created_at, updated_at)
               VALUES (?, ?, ?, ?, 0, ?, ?)"#,
        )
        .bind(token.id.to_string())
        .bind(user_id.to_string())
        .bind(&token.token_hash)
        .bind(format_datetime(&token.expires_at))
        .bind(format_datetime(&token.created_at))
        .bind(format_datetime(&token.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error);

        match result {
            Ok(_) => Ok(token),
            Err(MemoryError::NotFound(_)) => Err(MemoryError::NotFound(format!("user {user_id}"))),
            Err(MemoryError::Conflict(_)) => Err(MemoryError::Conflict(
                "a token with this hash already exists".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn get_token(&self, token_id: &Uuid) -> Result<Option<RefreshToken>, MemoryError> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE id = ?")
            .bind(token_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(TokenRow::from_row(&row).map_err(decode_error)?.into_token()?)),
            None => Ok(None),
        }
    }

    async fn find_usable(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, MemoryError> {
        let row = sqlx::query(
            "SELECT * FROM refresh_tokens WHERE token_hash = ? AND revoked = 0 AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(format_datetime(&now))
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(TokenRow::from_row(&row).map_err(decode_error)?.into_token()?)),
            None => Ok(None),
        }
    }

    async fn revoke_token(&self, token_id: &Uuid) -> Result<(), MemoryError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, updated_at = ? WHERE id = ? AND revoked = 0",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(token_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 && self.get_token(token_id).await?.is_none() {
            return Err(MemoryError::NotFound(format!("token {token_id}")));
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: &Uuid) -> Result<u64, MemoryError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, updated_at = ? WHERE user_id = ? AND revoked = 0",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(user_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn reap_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, MemoryError> {
        let now = format_datetime(&now);
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = 1, updated_at = ? WHERE expires_at < ? AND revoked = 0",
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;
    use crate::sqlite::user::SqliteUserRepository;
    use chrono::Duration;
    use recall_core::repository::user::UserRepository;
    use recall_types::user::NewUser;

    async fn setup() -> (DatabasePool, SqliteTokenRepository, Uuid) {
        let pool = test_pool().await;
        let user = SqliteUserRepository::new(pool.clone())
            .create_user(&NewUser::new("tok@example.com", "tokens", "hash", None))
            .await
            .unwrap();
        (pool.clone(), SqliteTokenRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_and_find_usable() {
        let (_pool, repo, user_id) = setup().await;
        let now = Utc::now();
        let token = repo
            .create_token(&user_id, "hash-a", now + Duration::days(7))
            .await
            .unwrap();

        let found = repo.find_usable("hash-a", now).await.unwrap().unwrap();
        assert_eq!(found, token);
        assert!(repo.find_usable("hash-b", now).await.unwrap().is_none());
        assert!(
            repo.find_usable("hash-a", now + Duration::days(8))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_for_unknown_user() {
        let (_pool, repo, _) = setup().await;
        let err = repo
            .create_token(&Uuid::now_v7(), "h", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_hash_conflict() {
        let (_pool, repo, user_id) = setup().await;
        let expires = Utc::now() + Duration::days(1);
        repo.create_token(&user_id, "same", expires).await.unwrap();
        let err = repo.create_token(&user_id, "same", expires).await.unwrap_err();
        assert!(matches!(err, MemoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (_pool, repo, user_id) = setup().await;
        let token = repo
            .create_token(&user_id, "h", Utc::now() + Duration::days(1))
            .await
            .unwrap();

        repo.revoke_token(&token.id).await.unwrap();
        repo.revoke_token(&token.id).await.unwrap();

        let stored = repo.get_token(&token.id).await.unwrap().unwrap();
        assert!(stored.revoked);
        assert!(repo.find_usable("h", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_unknown_token() {
        let (_pool, repo, _) = setup().await;
        let err = repo.revoke_token(&Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_revocation_cannot_be_undone() {
        let (pool, repo, user_id) = setup().await;
        let token = repo
            .create_token(&user_id, "h", Utc::now() + Duration::days(1))
            .await
            .unwrap();
        repo.revoke_token(&token.id).await.unwrap();

        let err = sqlx::query("UPDATE refresh_tokens SET revoked = 0 WHERE id = ?")
            .bind(token.id.to_string())
            .execute(&pool.writer)
            .await
            .unwrap_err();
        assert!(matches!(map_sqlx_error(err), MemoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reap_expired_is_idempotent() {
        let (_pool, repo, user_id) = setup().await;
        let now = Utc::now();
        repo.create_token(&user_id, "old", now - Duration::hours(1)).await.unwrap();
        repo.create_token(&user_id, "older", now - Duration::days(2)).await.unwrap();
        let live = repo
            .create_token(&user_id, "live", now + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(repo.reap_expired_tokens(now).await.unwrap(), 2);
        assert_eq!(repo.reap_expired_tokens(now).await.unwrap(), 0);
        assert!(!repo.get_token(&live.id).await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_concurrent_reaps_revoke_each_token_once() {
        let (_pool, repo, user_id) = setup().await;
        let now = Utc::now();
        for i in 0..5 {
            repo.create_token(&user_id, &format!("exp-{i}"), now - Duration::minutes(1))
                .await
                .unwrap();
        }

        let repo = std::sync::Arc::new(repo);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.reap_expired_tokens(now).await.unwrap() })
            })
            .collect();

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let (_pool, repo, user_id) = setup().await;
        let expires = Utc::now() + Duration::days(1);
        let first = repo.create_token(&user_id, "a", expires).await.unwrap();
        repo.create_token(&user_id, "b", expires).await.unwrap();
        repo.revoke_token(&first.id).await.unwrap();

        assert_eq!(repo.revoke_all_for_user(&user_id).await.unwrap(), 1);
    }
}
