//! SHA-256 hashing of refresh token secrets.
//!
//! Implements the `TokenHasher` trait from `recall-core` using the
//! `sha2` crate (RustCrypto ecosystem).

use sha2::{Digest, Sha256};

use recall_core::service::hash::TokenHasher;

/// SHA-256 implementation of `TokenHasher`.
///
/// Produces lowercase hex digests. Refresh token secrets are high-entropy
/// random strings, so an unsalted fast hash is sufficient for lookup.
pub struct Sha256TokenHasher;

impl Sha256TokenHasher {
    /// Create a new hasher.
    pub fn new() -> Self {
        Self
    }
}

impl Default for Sha256TokenHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenHasher for Sha256TokenHasher {
    fn hash_secret(&self, secret: &str) -> String {
        let digest = Sha256::digest(secret.as_bytes());
        format!("{:x}", digest)
    }
}
