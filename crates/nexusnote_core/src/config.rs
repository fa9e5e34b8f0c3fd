//! Configuration types for the NexusNote sync core.
//!
//! This module provides the [`Config`] struct which holds the collaboration
//! endpoint, the snapshot API endpoint, the snapshot retention policy and the
//! local storage location. Configuration is persisted as TOML.
//!
//! # Example
//!
//! ```ignore
//! use nexusnote_core::config::Config;
//!
//! let config = Config::load_from(Path::new("nexusnote.toml"))?;
//! let policy = &config.snapshots;
//! assert_eq!(policy.max_snapshots_per_doc, 100);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NexusError, Result};

/// Snapshots retained per document locally.
pub const MAX_SNAPSHOTS_PER_DOC: usize = 100;

/// Minimum plain-text length delta (in characters) for an automatic snapshot.
pub const MIN_CHANGE_THRESHOLD: usize = 50;

/// Seconds between automatic snapshots of the same document.
pub const AUTO_SNAPSHOT_INTERVAL_SECS: u64 = 5 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Live collaboration endpoint
    #[serde(default)]
    pub collab: CollabConfig,

    /// Remote snapshot API (snapshot sync is disabled when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_api: Option<SnapshotApiConfig>,

    /// Snapshot capture and retention policy
    #[serde(default)]
    pub snapshots: SnapshotPolicy,

    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Settings for the live collaboration connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabConfig {
    /// Collaboration server URL (e.g., "wss://collab.nexusnote.app")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Token handed to the connection on construction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Whether the engine starts in the online state
    #[serde(default = "default_true")]
    pub start_online: bool,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            start_online: true,
        }
    }
}

/// Settings for the remote snapshot HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotApiConfig {
    /// Base URL; endpoints are resolved below it (e.g., "{base_url}/snapshots/sync")
    pub base_url: String,

    /// Bearer token sent with each request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl SnapshotApiConfig {
    /// Create a config for the given base URL with default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: default_request_timeout(),
        }
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Snapshot capture and retention policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotPolicy {
    /// Snapshots kept per document; older ones are pruned after each insert
    pub max_snapshots_per_doc: usize,

    /// Minimum plain-text length delta for `auto` snapshots
    pub min_change_threshold: usize,

    /// Seconds that must elapse since the latest snapshot before an auto snapshot
    pub auto_interval_secs: u64,

    /// Local edits after which an auto snapshot is attempted regardless of the
    /// interval. `0` disables edit-count gating.
    pub auto_snapshot_edits: u32,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            max_snapshots_per_doc: MAX_SNAPSHOTS_PER_DOC,
            min_change_threshold: MIN_CHANGE_THRESHOLD,
            auto_interval_secs: AUTO_SNAPSHOT_INTERVAL_SECS,
            auto_snapshot_edits: 100,
        }
    }
}

impl SnapshotPolicy {
    /// Auto snapshot interval in milliseconds.
    pub fn auto_interval_ms(&self) -> i64 {
        (self.auto_interval_secs as i64).saturating_mul(1000)
    }
}

/// Where local documents and snapshots are persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file. In-memory storage is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| NexusError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Load config from a path, returning the default if it can't be read.
    pub fn load_from_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config ({}): {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
