//! Shared domain types for Recall.
//!
//! Users, profiles, chat sessions and messages, refresh tokens, embedding
//! references, configuration, and the error taxonomy shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, base64.

pub mod chat;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod timestamp;
pub mod token;
pub mod user;
