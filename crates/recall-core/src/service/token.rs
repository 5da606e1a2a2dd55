//! Refresh token service.
//!
//! Hashes token secrets before they reach the repository, so the store
//! only ever sees hashes.

use chrono::{DateTime, Utc};
use recall_types::error::MemoryError;
use recall_types::token::RefreshToken;
use tracing::info;
use uuid::Uuid;

use crate::repository::token::TokenRepository;
use crate::service::hash::TokenHasher;

/// Service wrapping `TokenRepository` with secret hashing.
pub struct TokenService<T: TokenRepository, H: TokenHasher> {
    token_repo: T,
    hasher: H,
}

impl<T: TokenRepository, H: TokenHasher> TokenService<T, H> {
    pub fn new(token_repo: T, hasher: H) -> Self {
        Self { token_repo, hasher }
    }

    /// Store the hash of a secret issued at login.
    pub async fn store_secret(
        &self,
        user_id: &Uuid,
        secret: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, MemoryError> {
        if secret.is_empty() {
            return Err(MemoryError::InvalidArgument(
                "token secret must not be empty".to_string(),
            ));
        }
        let hash = self.hasher.hash_secret(secret);
        self.token_repo.create_token(user_id, &hash, expires_at).await
    }

    /// Resolve a presented secret to its token, if still usable.
    pub async fn find_usable(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, MemoryError> {
        let hash = self.hasher.hash_secret(secret);
        self.token_repo.find_usable(&hash, now).await
    }

    pub async fn revoke(&self, token_id: &Uuid) -> Result<(), MemoryError> {
        self.token_repo.revoke_token(token_id).await
    }

    /// Revoke every live token of a user (logout everywhere).
    pub async fn revoke_all_for_user(&self, user_id: &Uuid) -> Result<u64, MemoryError> {
        let revoked = self.token_repo.revoke_all_for_user(user_id).await?;
        info!(user_id = %user_id, revoked, "User refresh tokens revoked");
        Ok(revoked)
    }

    /// Expiry sweep. Returns how many tokens were newly revoked.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64, MemoryError> {
        let reaped = self.token_repo.reap_expired_tokens(now).await?;
        if reaped > 0 {
            info!(reaped, "Expired refresh tokens revoked");
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ReverseHasher;

    impl TokenHasher for ReverseHasher {
        fn hash_secret(&self, secret: &str) -> String {
            secret.chars().rev().collect()
        }
    }

    #[derive(Default)]
    struct MemTokens {
        tokens: Mutex<Vec<RefreshToken>>,
    }

    impl TokenRepository for MemTokens {
        async fn create_token(
            &self,
            user_id: &Uuid,
            token_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<RefreshToken, MemoryError> {
            let now = Utc::now();
            let token = RefreshToken {
                id: Uuid::now_v7(),
                user_id: *user_id,
                token_hash: token_hash.to_string(),
                expires_at,
                revoked: false,
                created_at: now,
                updated_at: now,
            };
            self.tokens.lock().unwrap().push(token.clone());
            Ok(token)
        }

        async fn get_token(&self, token_id: &Uuid) -> Result<Option<RefreshToken>, MemoryError> {
            Ok(self
                .tokens
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == *token_id)
                .cloned())
        }

        async fn find_usable(
            &self,
            token_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<RefreshToken>, MemoryError> {
            Ok(self
                .tokens
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.token_hash == token_hash && t.is_usable(now))
                .cloned())
        }

        async fn revoke_token(&self, token_id: &Uuid) -> Result<(), MemoryError> {
            let mut tokens = self.tokens.lock().unwrap();
            let token = tokens
                .iter_mut()
                .find(|t| t.id == *token_id)
                .ok_or_else(|| MemoryError::NotFound(format!("token {token_id}")))?;
            token.revoked = true;
            Ok(())
        }

        async fn revoke_all_for_user(&self, user_id: &Uuid) -> Result<u64, MemoryError> {
            let mut count = 0;
            for token in self.tokens.lock().unwrap().iter_mut() {
                if token.user_id == *user_id && !token.revoked {
                    token.revoked = true;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn reap_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, MemoryError> {
            let mut count = 0;
            for token in self.tokens.lock().unwrap().iter_mut() {
                if token.expires_at < now && !token.revoked {
                    token.revoked = true;
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    #[tokio::test]
    async fn test_store_secret_persists_hash_only() {
        let service = TokenService::new(MemTokens::default(), ReverseHasher);
        let user_id = Uuid::now_v7();
        let token = service
            .store_secret(&user_id, "s3cret", Utc::now() + chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(token.token_hash, "terc3s");
        assert_ne!(token.token_hash, "s3cret");
    }

    #[tokio::test]
    async fn test_find_usable_by_secret() {
        let service = TokenService::new(MemTokens::default(), ReverseHasher);
        let user_id = Uuid::now_v7();
        let now = Utc::now();
        let token = service
            .store_secret(&user_id, "abc", now + chrono::Duration::hours(1))
            .await
            .unwrap();

        let found = service.find_usable("abc", now).await.unwrap().unwrap();
        assert_eq!(found.id, token.id);
        assert!(service.find_usable("other", now).await.unwrap().is_none());

        service.revoke(&token.id).await.unwrap();
        assert!(service.find_usable("abc", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_secret_rejected() {
        let service = TokenService::new(MemTokens::default(), ReverseHasher);
        let err = service
            .store_secret(&Uuid::now_v7(), "", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_reap_expired_counts_newly_revoked() {
        let service = TokenService::new(MemTokens::default(), ReverseHasher);
        let user_id = Uuid::now_v7();
        let now = Utc::now();
        service
            .store_secret(&user_id, "old", now - chrono::Duration::minutes(1))
            .await
            .unwrap();
        service
            .store_secret(&user_id, "new", now + chrono::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(service.reap_expired(now).await.unwrap(), 1);
        assert_eq!(service.reap_expired(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_leaves_others() {
        let service = TokenService::new(MemTokens::default(), ReverseHasher);
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        let now = Utc::now();
        let expires = now + chrono::Duration::hours(1);
        service.store_secret(&alice, "a1", expires).await.unwrap();
        service.store_secret(&alice, "a2", expires).await.unwrap();
        service.store_secret(&bob, "b1", expires).await.unwrap();

        assert_eq!(service.revoke_all_for_user(&alice).await.unwrap(), 2);
        assert!(service.find_usable("a1", now).await.unwrap().is_none());
        assert!(service.find_usable("b1", now).await.unwrap().is_some());
        assert_eq!(service.revoke_all_for_user(&alice).await.unwrap(), 0);
    }
}
