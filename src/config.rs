//! Runtime configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{OpenMode, StoreOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location of the metadata store.
    pub database_path: PathBuf,
    pub journal_mode: String,
    pub synchronous: String,
    pub busy_timeout_ms: u32,
    /// Number of file contents the channel keeps in memory.
    pub content_cache_capacity: usize,
    /// Reject every mutation arriving through the channel.
    pub read_only: bool,
    /// Remember "does not exist" answers until flushed.
    pub negative_path_caching: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            journal_mode: WAL.to_string(),
            synchronous: NORMAL.to_string(),
            busy_timeout_ms: 5000,
            content_cache_capacity: 1024,
            read_only: false,
            negative_path_caching: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        tracing::debug!("[Config] Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            mode: OpenMode::Create,
            journal_mode: Some(self.journal_mode.clone()),
            synchronous: Some(self.synchronous.clone()),
            foreign_keys: true,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vfs-channel")
        .join("metadata.db")
}

const WAL: &str = "WAL";
const NORMAL: &str = "NORMAL";
