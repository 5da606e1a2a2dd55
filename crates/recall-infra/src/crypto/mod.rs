//! Cryptographic operations for Recall.
//!
//! - `hash`: SHA-256 hashing of refresh token secrets

pub mod hash;
