//! Retention configuration.
//!
//! Values come from an optional YAML file and are then overridden by
//! command-line flags. Everything is validated before the first registry
//! or git call is made.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReaperError, Result};

/// Default cap on the number of images kept in a repository.
pub const DEFAULT_MAX_TOTAL_IMAGES: usize = 900;

/// Default number of priority images that always survive eviction.
pub const DEFAULT_MIN_PRIORITY_FLOOR: usize = 50;

/// Default number of concurrent classification workers.
pub const DEFAULT_CLASSIFY_CONCURRENCY: usize = 8;

/// Default timeout for a single git subprocess, in seconds.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 10;

/// Retention configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Global cap on images in the repository
    pub max_total_images: usize,

    /// Priority images are never evicted below this count
    pub min_priority_floor: usize,

    /// Tags that are never eligible for deletion
    pub blacklist: BTreeSet<String>,

    /// Maximum concurrent classification workers
    pub classify_concurrency: usize,

    /// Per-call timeout for git subprocesses, in seconds
    pub oracle_timeout_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_total_images: DEFAULT_MAX_TOTAL_IMAGES,
            min_priority_floor: DEFAULT_MIN_PRIORITY_FLOOR,
            blacklist: BTreeSet::new(),
            classify_concurrency: DEFAULT_CLASSIFY_CONCURRENCY,
            oracle_timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
        }
    }
}

impl RetentionConfig {
    /// Default config file location (`~/.image-reaper/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".image-reaper").join("config.yaml"))
    }

    /// Parse a config from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read a config file. The file must exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReaperError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&text)
    }

    /// Load from an explicit path, or from the default path when present,
    /// or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading default config file");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Check that the parameters describe a usable policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_total_images == 0 {
            return Err(ReaperError::ConfigError(
                "max_total_images must be greater than zero".to_string(),
            ));
        }

        if self.min_priority_floor > self.max_total_images {
            return Err(ReaperError::ConfigError(format!(
                "min_priority_floor ({}) cannot exceed max_total_images ({})",
                self.min_priority_floor, self.max_total_images
            )));
        }

        if self.classify_concurrency == 0 {
            return Err(ReaperError::ConfigError(
                "classify_concurrency must be greater than zero".to_string(),
            ));
        }

        if self.oracle_timeout_secs == 0 {
            return Err(ReaperError::ConfigError(
                "oracle_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.blacklist.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ReaperError::ConfigError(
                "blacklist entries must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Timeout applied to each git subprocess.
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    /// Whether a tag protects its image from deletion.
    pub fn is_blacklisted(&self, tag: &str) -> bool {
        self.blacklist.contains(tag)
    }
}
