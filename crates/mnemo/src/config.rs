//! Configuration management for mnemo.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (MNEMO_*)
//! 2. Config file (MNEMO_CONFIG, or the platform data dir's config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use mnemo_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default owner when `--owner` is not given
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Defaults for lifecycle commands
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Embedder for the vector backend ("hashing", or "minilm" with the embeddings feature)
    #[serde(default = "default_embedder")]
    pub embedder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Age cutoff for archival, in days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: f64,

    /// Recall preset used when none is given
    #[serde(default = "default_recall_preset")]
    pub recall_preset: String,
}

// Default value functions
fn default_owner() -> String {
    "default".to_string()
}

fn default_embedder() -> String {
    "hashing".to_string()
}

fn default_max_age_days() -> f64 {
    7.0
}

fn default_recall_preset() -> String {
    "comprehensive".to_string()
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "mnemo", "mnemo") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mnemo")
    }
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("memory.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            embedder: default_embedder(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            recall_preset: default_recall_preset(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            storage: StorageConfig::default(),
            lifecycle: LifecycleConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;

        if let Ok(path) = std::env::var("MNEMO_DATABASE_PATH") {
            config.storage.database_path = PathBuf::from(path);
        }
        if let Ok(owner) = std::env::var("MNEMO_OWNER") {
            if !owner.trim().is_empty() {
                config.owner = owner;
            }
        }

        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config
            .engine
            .validate()
            .context("Invalid [engine] configuration")?;
        Ok(config)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MNEMO_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Owner from the command line, or the configured default.
    pub fn resolve_owner(&self, flag: Option<&str>) -> String {
        flag.filter(|o| !o.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| self.owner.clone())
    }

    /// Ensure the database directory exists.
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.storage.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.owner, "default");
        assert_eq!(config.storage.embedder, "hashing");
        assert!(config.storage.database_path.ends_with("memory.db"));
        assert_eq!(config.lifecycle.max_age_days, 7.0);
        assert_eq!(config.lifecycle.recall_preset, "comprehensive");
        assert_eq!(config.engine.attention.capacity, 7);
    }

    #[test]
    fn test_load_partial_file() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
owner = "ci-ops"

[storage]
database_path = "/var/lib/mnemo/ops.db"

[engine.scoring]
archive_threshold = 30.0

[engine.synthesis]
backend_timeout_ms = 500
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).expect("Failed to load config");

        assert_eq!(config.owner, "ci-ops");
        assert_eq!(config.storage.database_path, PathBuf::from("/var/lib/mnemo/ops.db"));
        assert_eq!(config.storage.embedder, "hashing");
        assert_eq!(config.engine.scoring.archive_threshold, 30.0);
        assert_eq!(config.engine.scoring.recency_weight, 30.0);
        assert_eq!(config.engine.synthesis.backend_timeout_ms, 500);
        assert_eq!(config.lifecycle.max_age_days, 7.0);
    }

    #[test]
    fn test_load_nonexistent_uses_defaults() {
        let temp = tempdir().expect("Failed to create temp dir");
        let config = Config::load_from(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.owner, "default");
    }

    #[test]
    fn test_invalid_engine_section_is_rejected() {
        let temp = tempdir().expect("Failed to create temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[engine.attention]\ncapacity = 0\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_resolve_owner() {
        let config = Config::default();
        assert_eq!(config.resolve_owner(Some("ci-9")), "ci-9");
        assert_eq!(config.resolve_owner(Some("  ")), "default");
        assert_eq!(config.resolve_owner(None), "default");
    }

    #[test]
    fn test_ensure_dirs_creates_database_directory() {
        let temp = tempdir().expect("Failed to create temp dir");
        let config = Config {
            storage: StorageConfig {
                database_path: temp.path().join("nested").join("memory.db"),
                ..StorageConfig::default()
            },
            ..Config::default()
        };

        assert!(!temp.path().join("nested").exists());
        config.ensure_dirs().expect("Failed to create directories");
        assert!(temp.path().join("nested").exists());
    }
}
