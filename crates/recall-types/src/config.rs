//! Configuration types for Recall.
//!
//! `MemoryConfig` is the top-level `config.toml`. Every field has a default,
//! so an empty file (or no file) yields a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MIN_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Per-call bound on relational store operations.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Per-call bound on embedding requests.
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,

    /// Per-call bound on similarity searches.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_embed_timeout_ms() -> u64 {
    10_000
}

fn default_search_timeout_ms() -> u64 {
    5_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            embed_timeout_ms: default_embed_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Clamp values into their usable ranges.
    pub fn sanitized(mut self) -> Self {
        self.store_timeout_ms = self.store_timeout_ms.max(MIN_TIMEOUT_MS);
        self.embed_timeout_ms = self.embed_timeout_ms.max(MIN_TIMEOUT_MS);
        self.search_timeout_ms = self.search_timeout_ms.max(MIN_TIMEOUT_MS);
        self.reconcile = self.reconcile.sanitized();
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

/// Background reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Failed attempts after which a message is left unlinked.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Pending tasks picked up per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pause between passes in watch mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_batch_size() -> u32 {
    64
}

fn default_interval_secs() -> u64 {
    30
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            batch_size: default_batch_size(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl ReconcileConfig {
    pub fn sanitized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        self.batch_size = self.batch_size.max(1);
        self.interval_secs = self.interval_secs.max(1);
        self.max_backoff_ms = self.max_backoff_ms.max(self.base_backoff_ms);
        self
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_default_values() {
        let config = MemoryConfig::default();
        assert_eq!(config.store_timeout_ms, 5_000);
        assert_eq!(config.embed_timeout_ms, 10_000);
        assert_eq!(config.reconcile.max_attempts, 5);
        assert_eq!(config.reconcile.batch_size, 64);
    }

    #[test]
    fn test_memory_config_deserialize_with_defaults() {
        let config: MemoryConfig = toml::from_str("").unwrap();
        assert_eq!(config, MemoryConfig::default());
    }

    #[test]
    fn test_memory_config_deserialize_with_values() {
        let toml_str = r#"
embed_timeout_ms = 2500

[reconcile]
max_attempts = 3
base_backoff_ms = 200
"#;
        let config: MemoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.embed_timeout_ms, 2_500);
        assert_eq!(config.store_timeout_ms, 5_000);
        assert_eq!(config.reconcile.max_attempts, 3);
        assert_eq!(config.reconcile.base_backoff_ms, 200);
        assert_eq!(config.reconcile.max_backoff_ms, 300_000);
    }

    #[test]
    fn test_sanitized_clamps() {
        let config = MemoryConfig {
            store_timeout_ms: 0,
            embed_timeout_ms: 1,
            search_timeout_ms: 50,
            reconcile: ReconcileConfig {
                max_attempts: 0,
                base_backoff_ms: 5_000,
                max_backoff_ms: 10,
                batch_size: 0,
                interval_secs: 0,
            },
        }
        .sanitized();

        assert_eq!(config.store_timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(config.embed_timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(config.search_timeout_ms, MIN_TIMEOUT_MS);
        assert_eq!(config.reconcile.max_attempts, 1);
        assert_eq!(config.reconcile.batch_size, 1);
        assert_eq!(config.reconcile.interval_secs, 1);
        assert_eq!(config.reconcile.max_backoff_ms, 5_000);
    }
}
