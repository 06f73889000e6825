//! Configuration loading and path resolution
//!
//! Optional settings are loaded from `~/.config/gao-dev/config.toml`.
//! Database locations are resolved once into an immutable [`StoreConfig`]
//! that is passed into each component's constructor.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable overriding the unified database path
pub const DB_PATH_ENV: &str = "GAO_DEV_DB_PATH";

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gao-dev")
            .join("config.toml")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gao-dev")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("gao-dev.log")
    }
}

/// Resolved on-disk layout for one project.
///
/// All components take this by value or reference; nothing mutates it after
/// construction. The unified database holds epics, stories, sprints, and
/// workflow executions; the documents database holds the learning index and
/// remains a separate file.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Unified state database (`gao_dev.db`)
    pub db_path: PathBuf,
    /// Documents database holding the learning index
    pub documents_db_path: PathBuf,
    /// Directory for timestamped database backups
    pub backup_dir: PathBuf,
    /// Append-only markdown sync conflict log
    pub conflict_log_path: PathBuf,
    /// Legacy state database consumed by the unification migration
    pub legacy_state_db_path: PathBuf,
    /// Legacy context usage database consumed by the unification migration
    pub legacy_context_db_path: PathBuf,
    /// Whether the unification migration copies the legacy database files
    /// into `backup_dir` before finalizing (on by default)
    pub backup_legacy_on_migrate: bool,
}

impl StoreConfig {
    /// Resolve the layout rooted at the current working directory.
    ///
    /// The unified database path honors the `GAO_DEV_DB_PATH` environment
    /// variable; everything else is anchored at the project root.
    pub fn resolve() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve_in(&root)
    }

    /// Resolve the layout rooted at an explicit project directory.
    pub fn resolve_in(root: &std::path::Path) -> Self {
        let db_path = match std::env::var(DB_PATH_ENV) {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => root.join("gao_dev.db"),
        };

        // Documents DB stays separate; prefer .gao-dev, fall back to .gao
        // when only the older location exists.
        let gao_dev_docs = root.join(".gao-dev").join("documents.db");
        let gao_docs = root.join(".gao").join("documents.db");
        let documents_db_path = if !gao_dev_docs.exists() && gao_docs.exists() {
            gao_docs
        } else {
            gao_dev_docs
        };

        Self {
            db_path,
            documents_db_path,
            backup_dir: root.join(".gao").join("backups"),
            conflict_log_path: root.join("gao_dev").join("logs").join("sync_conflicts.log"),
            legacy_state_db_path: root.join("gao-dev-state.db"),
            legacy_context_db_path: root.join(".gao").join("context_usage.db"),
            backup_legacy_on_migrate: true,
        }
    }

    /// Build a layout where every path lives under one directory.
    ///
    /// Used by tests and tools that operate on an isolated copy.
    pub fn rooted_at(dir: &std::path::Path) -> Self {
        Self {
            db_path: dir.join("gao_dev.db"),
            documents_db_path: dir.join(".gao-dev").join("documents.db"),
            backup_dir: dir.join(".gao").join("backups"),
            conflict_log_path: dir.join("gao_dev").join("logs").join("sync_conflicts.log"),
            legacy_state_db_path: dir.join("gao-dev-state.db"),
            legacy_context_db_path: dir.join(".gao").join("context_usage.db"),
            backup_legacy_on_migrate: true,
        }
    }
}
