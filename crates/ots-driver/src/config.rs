use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};
use crate::fs::FsDriver;
use crate::memory::MemoryDriver;
use crate::traits::Driver;

/// Flush strategy for the filesystem driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` every blob, its directory, and the root file before
    /// acknowledging a write.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering (fast, not crash-safe).
    OsDefault,
}

impl SyncMode {
    pub fn syncs(self) -> bool {
        matches!(self, Self::EveryWrite)
    }
}

/// Options for [`FsDriver`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Place blobs under two-hex-character prefix subdirectories.
    #[serde(default = "default_shard")]
    pub shard: bool,
    /// Flush strategy.
    #[serde(default)]
    pub sync: SyncMode,
}

fn default_shard() -> bool {
    true
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            shard: true,
            sync: SyncMode::default(),
        }
    }
}

impl FsConfig {
    /// Unsynced, unsharded: for tests and scratch stores.
    pub fn scratch() -> Self {
        Self {
            shard: false,
            sync: SyncMode::OsDefault,
        }
    }
}

/// Which driver backs a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DriverConfig {
    /// Volatile in-process storage.
    #[default]
    Memory,
    /// Two bucket directories plus a root file under `path`.
    Filesystem {
        path: PathBuf,
        #[serde(default = "default_shard")]
        shard: bool,
        #[serde(default)]
        sync: SyncMode,
    },
}

impl DriverConfig {
    /// A filesystem driver rooted at `path` with default options.
    pub fn filesystem(path: impl Into<PathBuf>) -> Self {
        let defaults = FsConfig::default();
        Self::Filesystem {
            path: path.into(),
            shard: defaults.shard,
            sync: defaults.sync,
        }
    }
}

/// Top-level configuration file.
///
/// ```toml
/// [driver]
/// kind = "filesystem"
/// path = "/var/lib/ots"
/// shard = true
/// sync = "every-write"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub driver: DriverConfig,
}

impl StoreConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> DriverResult<Self> {
        toml::from_str(s).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> DriverResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

/// Construct the driver a configuration names.
pub fn open_driver(config: &DriverConfig) -> DriverResult<Arc<dyn Driver>> {
    match config {
        DriverConfig::Memory => Ok(Arc::new(MemoryDriver::new())),
        DriverConfig::Filesystem { path, shard, sync } => {
            let fs_config = FsConfig {
                shard: *shard,
                sync: *sync,
            };
            Ok(Arc::new(FsDriver::open(path, fs_config)?))
        }
    }
}
