//! Memory coordinator and repository trait definitions for Recall.
//!
//! This crate defines the "ports" (repository and provider traits) that the
//! infrastructure layer implements. It depends only on `recall-types` --
//! never on `recall-infra` or any database/IO crate.

pub mod memory;
pub mod repository;
pub mod service;
