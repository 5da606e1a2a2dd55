//! TokenHasher trait for one-way hashing of token secrets.
//!
//! Defined in recall-core so services can hash secrets without coupling to
//! a specific hashing algorithm. The `Sha256TokenHasher` adapter lives in
//! recall-infra.

/// Abstraction over one-way hashing of refresh token secrets.
pub trait TokenHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given secret.
    fn hash_secret(&self, secret: &str) -> String;
}
