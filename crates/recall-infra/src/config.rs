//! Configuration and data-directory resolution for Recall.
//!
//! Reads `config.toml` from the data directory (`~/.recall/` in production)
//! and deserializes it into [`MemoryConfig`]. Falls back to defaults when the
//! file is missing or malformed, and clamps every value into range.

use std::path::{Path, PathBuf};

use recall_types::config::MemoryConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RECALL_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `RECALL_DATA_DIR` environment variable
/// 2. `~/.recall`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".recall");
    }

    // Last resort: current directory
    PathBuf::from(".recall")
}

/// SQLite URL for the relational store inside `data_dir`.
pub fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/recall.db?mode=rwc", data_dir.display())
}

/// LanceDB directory inside `data_dir`.
pub fn vector_store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vector_store")
}

/// Model cache directory for the local embedder.
pub fn model_cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join("models")
}

/// Load memory configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: warning, then defaults.
pub async fn load_memory_config(data_dir: &Path) -> MemoryConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return MemoryConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return MemoryConfig::default();
        }
    };

    match toml::from_str::<MemoryConfig>(&content) {
        Ok(config) => config.sanitized(),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            MemoryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_memory_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_memory_config(tmp.path()).await;
        assert_eq!(config, MemoryConfig::default());
    }

    #[tokio::test]
    async fn load_memory_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
store_timeout_ms = 750

[reconcile]
max_attempts = 8
batch_size = 16
"#,
        )
        .await
        .unwrap();

        let config = load_memory_config(tmp.path()).await;
        assert_eq!(config.store_timeout_ms, 750);
        assert_eq!(config.embed_timeout_ms, 10_000);
        assert_eq!(config.reconcile.max_attempts, 8);
        assert_eq!(config.reconcile.batch_size, 16);
    }

    #[tokio::test]
    async fn load_memory_config_clamps_values() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "search_timeout_ms = 1\n[reconcile]\nmax_attempts = 0\n",
        )
        .await
        .unwrap();

        let config = load_memory_config(tmp.path()).await;
        assert_eq!(config.search_timeout_ms, 100);
        assert_eq!(config.reconcile.max_attempts, 1);
    }

    #[tokio::test]
    async fn load_memory_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_memory_config(tmp.path()).await;
        assert_eq!(config, MemoryConfig::default());
    }

    #[test]
    fn default_paths_live_under_data_dir() {
        let data_dir = PathBuf::from("/home/user/.recall");
        assert_eq!(
            default_database_url(&data_dir),
            "sqlite:///home/user/.recall/recall.db?mode=rwc"
        );
        assert_eq!(
            vector_store_path(&data_dir),
            PathBuf::from("/home/user/.recall/vector_store")
        );
        assert_eq!(model_cache_path(&data_dir), PathBuf::from("/home/user/.recall/models"));
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-recall");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-recall"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
