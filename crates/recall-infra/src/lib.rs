//! Infrastructure layer for Recall.
//!
//! Contains implementations of the ports defined in `recall-core`: SQLite
//! relational storage and work queue, the LanceDB + fastembed embedding
//! provider, SHA-256 token hashing, and configuration loading.

pub mod config;
pub mod crypto;
pub mod sqlite;
pub mod vector;
