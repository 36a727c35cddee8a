//! Durable per-session flags
//!
//! Stores boolean flags in a JSON file in the application data directory so
//! they survive restarts of the client. Used to remember that a session's
//! introduction has already been played.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

/// Key recording that the introduction for a session has played
pub(crate) fn intro_played_key(session_id: &str) -> String {
    format!("intro_played_{}", session_id)
}

/// A durable key-value store of boolean flags
pub(crate) trait FlagStore: Send + Sync {
    fn is_set(&self, key: &str) -> bool;
    fn set(&self, key: &str) -> Result<(), StoreError>;
}

/// On-disk flag file contents
#[derive(Debug, Default, Serialize, Deserialize)]
struct FlagFile {
    #[serde(default)]
    flags: BTreeMap<String, bool>,
}

/// Flag store backed by a JSON file
pub(crate) struct JsonFlagStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFlagStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store in the platform data directory
    pub(crate) fn in_data_dir() -> Result<Self, StoreError> {
        let path = default_flag_path().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(path))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load flags from disk
    ///
    /// Returns an empty set if the file doesn't exist or can't be read
    fn load(&self) -> FlagFile {
        if !self.path.exists() {
            return FlagFile::default();
        }

        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(flags) => flags,
                Err(e) => {
                    error!("Failed to parse flag file {:?}: {}", self.path, e);
                    FlagFile::default()
                }
            },
            Err(e) => {
                error!("Failed to read flag file {:?}: {}", self.path, e);
                FlagFile::default()
            }
        }
    }

    fn save(&self, flags: &FlagFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
                info!("Created flag store directory: {:?}", parent);
            }
        }

        let json = serde_json::to_string_pretty(flags)?;
        fs::write(&self.path, json).map_err(|e| StoreError::WriteFile {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl FlagStore for JsonFlagStore {
    fn is_set(&self, key: &str) -> bool {
        self.load().flags.get(key).copied().unwrap_or(false)
    }

    fn set(&self, key: &str) -> Result<(), StoreError> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut flags = self.load();
        if flags.flags.get(key).copied().unwrap_or(false) {
            return Ok(());
        }
        flags.flags.insert(key.to_string(), true);
        self.save(&flags)
    }
}

/// Default flag file location
fn default_flag_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("MockInterview").join("flags.json"))
}
