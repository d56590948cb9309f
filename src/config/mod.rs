//! Configuration system for Sift
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/sift/config.{SIFT_ENV}.json
//! 3. Default values
//!
//! Where SIFT_ENV can be: production (default), development, test
//!
//! # Examples
//!
//! ```no_run
//! use sift::config::IndexConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IndexConfig::load(None)?;
//! println!("Sync workers: {}", config.workers.sync);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variables
//!
//! Environment variables override config file values:
//! - SIFT_DB_PATH
//! - SIFT_SYNC_WORKERS

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pool sizes for each pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Workers walking directories that are absent from the index
    #[serde(default = "default_walk_workers")]
    pub new_subtree: usize,

    /// Workers re-enumerating directories whose metadata changed
    #[serde(default = "default_walk_workers")]
    pub deep_rescan: usize,

    /// Workers reading entries and issuing writes
    #[serde(default = "default_sync_workers")]
    pub sync: usize,

    /// Workers checking whether unseen paths still exist
    #[serde(default = "default_walk_workers")]
    pub deletion: usize,
}

fn default_walk_workers() -> usize {
    (num_cpus::get() / 2).clamp(1, 4)
}

fn default_sync_workers() -> usize {
    num_cpus::get().clamp(2, 16)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            new_subtree: default_walk_workers(),
            deep_rescan: default_walk_workers(),
            sync: default_sync_workers(),
            deletion: default_walk_workers(),
        }
    }
}

/// Main indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory base names the walk never descends into
    #[serde(default = "default_excluded_entries")]
    pub excluded_entries: Vec<String>,

    /// File extensions (without the dot) whose text content is indexed
    #[serde(default = "default_content_extensions")]
    pub content_extensions: Vec<String>,

    #[serde(default)]
    pub workers: WorkerConfig,

    /// Capacity of every stage queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Characters kept as the content snippet
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Files larger than this are indexed without content
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: u64,

    /// Database location (defaults to the platform data directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_excluded_entries() -> Vec<String> {
    [
        ".igloo", ".cache", ".idea", ".git", ".cargo", ".config", ".gemini", ".java", ".local",
        ".npm", ".nv", ".pki", ".rustup", ".steam",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_content_extensions() -> Vec<String> {
    ["txt", "md", "go", "py", "rs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_snippet_chars() -> usize {
    256
}

fn default_max_content_bytes() -> u64 {
    10_000_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            excluded_entries: default_excluded_entries(),
            content_extensions: default_content_extensions(),
            workers: WorkerConfig::default(),
            queue_capacity: default_queue_capacity(),
            snippet_chars: default_snippet_chars(),
            max_content_bytes: default_max_content_bytes(),
            db_path: None,
            debug: false,
        }
    }
}

impl IndexConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: IndexConfig = serde_json::from_str(&content)?;

        config.normalize();
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/sift/config.{SIFT_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::ValidationError(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        let env = std::env::var("SIFT_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = Self::config_dir() {
            let config_path = config_dir.join(format!("config.{}.json", env));

            if config_path.exists() {
                tracing::info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        tracing::info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SIFT_DB_PATH") {
            if !path.is_empty() {
                self.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(workers) = std::env::var("SIFT_SYNC_WORKERS") {
            match workers.parse::<usize>() {
                Ok(n) => self.workers.sync = n,
                Err(_) => tracing::warn!("Ignoring invalid SIFT_SYNC_WORKERS={:?}", workers),
            }
        }
    }

    /// Strip leading dots and lowercase extensions so lookups stay a plain comparison
    fn normalize(&mut self) {
        for ext in &mut self.content_extensions {
            *ext = ext.trim_start_matches('.').to_lowercase();
        }
        self.content_extensions.sort();
        self.content_extensions.dedup();
        self.excluded_entries.sort();
        self.excluded_entries.dedup();
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pools = [
            ("workers.new_subtree", self.workers.new_subtree),
            ("workers.deep_rescan", self.workers.deep_rescan),
            ("workers.sync", self.workers.sync),
            ("workers.deletion", self.workers.deletion),
        ];
        for (name, size) in pools {
            if size == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.snippet_chars == 0 {
            return Err(ConfigError::ValidationError(
                "snippet_chars must be greater than 0".to_string(),
            ));
        }

        if self.excluded_entries.iter().any(|e| e.contains('/')) {
            return Err(ConfigError::ValidationError(
                "excluded_entries must be base names, not paths".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether a directory with this base name is pruned from every walk
    pub fn is_excluded(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.excluded_entries.iter().any(|e| *e == name)
    }

    /// Whether the text content of `path` should be indexed
    pub fn is_content_eligible(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| self.content_extensions.iter().any(|e| *e == ext))
            .unwrap_or(false)
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sift"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
