//! Filesystem driver.
//!
//! On-disk layout:
//! ```text
//! <dir>/
//! ├── A/                  # bucket A
//! │   └── 3f/             # optional two-hex-char shard
//! │       └── 3f9a…e1     # blob file named by its content hash
//! ├── B/                  # bucket B
//! ├── root                # current root hash, hex + newline
//! └── active              # "A" or "B": bucket receiving new writes
//! ```
//!
//! Every file is written to a temporary name beside its destination,
//! flushed, renamed into place, and then the containing directory is
//! flushed. A blob is therefore either absent or complete under its final
//! name, and the rename is durable before the write is acknowledged.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use ots_crypto::ContentHasher;
use ots_types::{check_hash, Bucket, ContentHash};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::FsConfig;
use crate::error::{DriverError, DriverResult};
use crate::traits::Driver;

const ROOT_FILE: &str = "root";
const ACTIVE_FILE: &str = "active";
const TMP_PREFIX: &str = ".tmp-";

/// Durable driver storing one file per blob in two bucket directories.
pub struct FsDriver {
    dir: PathBuf,
    config: FsConfig,
    active: AtomicBool,
    /// Serializes bucket swaps so the `active` file and flag never disagree.
    swap_lock: Mutex<()>,
    tmp_counter: AtomicU64,
}

impl FsDriver {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// Temporary files left behind by an interrupted write are removed.
    pub fn open(dir: &Path, config: FsConfig) -> DriverResult<Self> {
        fs::create_dir_all(dir)?;
        let driver = Self {
            dir: dir.to_path_buf(),
            config,
            active: AtomicBool::new(false),
            swap_lock: Mutex::new(()),
            tmp_counter: AtomicU64::new(0),
        };
        for bucket in Bucket::ALL {
            driver.ensure_dir(&driver.bucket_dir(bucket))?;
        }

        let active = match fs::read_to_string(dir.join(ACTIVE_FILE)) {
            Ok(text) => Bucket::parse(&text)
                .map_err(|e| DriverError::Config(format!("bad active bucket file: {e}")))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Bucket::A,
            Err(e) => return Err(e.into()),
        };
        driver.active.store(active.into(), Ordering::SeqCst);

        let swept = driver.sweep_temp_files()?;
        if swept > 0 {
            warn!(swept, "removed temp files left by an interrupted write");
        }

        info!(path = %dir.display(), %active, shard = driver.config.shard, "opened filesystem driver");
        Ok(driver)
    }

    /// The store directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The options this driver was opened with.
    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.dir.join(bucket.as_str())
    }

    /// Path of the file holding `hash` in `bucket`.
    pub fn blob_path(&self, hash: &ContentHash, bucket: Bucket) -> PathBuf {
        let mut path = self.bucket_dir(bucket);
        if self.config.shard {
            path.push(hash.shard_prefix());
        }
        path.push(hash.to_hex());
        path
    }

    fn ensure_dir(&self, path: &Path) -> DriverResult<()> {
        if path.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(path)?;
        if self.config.sync.syncs() {
            if let Some(parent) = path.parent() {
                fsync_dir(parent)?;
            }
        }
        Ok(())
    }

    /// Write `bytes` to `dest` so that `dest` is either absent or complete.
    fn write_durable(&self, dest: &Path, bytes: &[u8]) -> DriverResult<()> {
        let parent = dest.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent")
        })?;
        self.ensure_dir(parent)?;

        let tmp = parent.join(format!(
            "{TMP_PREFIX}{}-{}",
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        let written = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            if self.config.sync.syncs() {
                file.sync_all()?;
            }
            drop(file);
            fs::rename(&tmp, dest)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        if self.config.sync.syncs() {
            fsync_dir(parent)?;
        }
        Ok(())
    }

    fn sweep_temp_files(&self) -> DriverResult<usize> {
        let mut swept = 0;
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(3) {
            let entry = entry.map_err(io::Error::from)?;
            let is_tmp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(TMP_PREFIX));
            if is_tmp && entry.file_type().is_file() {
                fs::remove_file(entry.path())?;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> DriverResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> DriverResult<()> {
    Ok(())
}

impl Driver for FsDriver {
    fn store(&self, bytes: &[u8], bucket: Bucket) -> DriverResult<ContentHash> {
        let hash = ContentHasher::BLOB.hash(bytes);
        let dest = self.blob_path(&hash, bucket);
        // Final names only ever hold complete blobs.
        if dest.is_file() {
            return Ok(hash);
        }
        self.write_durable(&dest, bytes)?;
        debug!(hash = %hash.short_hex(), %bucket, len = bytes.len(), "stored blob");
        Ok(hash)
    }

    fn load_in(&self, hash: &ContentHash, bucket: Bucket) -> DriverResult<Option<Vec<u8>>> {
        if hash.is_blank() {
            return Err(DriverError::BlankHash);
        }
        let bytes = match fs::read(self.blob_path(hash, bucket)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let computed = ContentHasher::BLOB.hash(&bytes);
        if computed != *hash {
            warn!(hash = %hash.short_hex(), %bucket, "blob content does not match its name");
            return Err(DriverError::HashMismatch {
                hash: *hash,
                computed,
            });
        }
        Ok(Some(bytes))
    }

    fn contains(&self, hash: &ContentHash, bucket: Bucket) -> DriverResult<bool> {
        match fs::metadata(self.blob_path(hash, bucket)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn store_root(&self, hash: &ContentHash) -> DriverResult<()> {
        if hash.is_blank() {
            return Err(DriverError::BlankHash);
        }
        self.write_durable(&self.dir.join(ROOT_FILE), format!("{hash}\n").as_bytes())?;
        debug!(root = %hash.short_hex(), "published root");
        Ok(())
    }

    fn load_root(&self) -> DriverResult<Option<ContentHash>> {
        let text = match fs::read_to_string(self.dir.join(ROOT_FILE)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(ContentHash::from_hex(text)?))
    }

    fn active_bucket(&self) -> Bucket {
        Bucket::from(self.active.load(Ordering::SeqCst))
    }

    fn swap_bucket(&self) -> DriverResult<Bucket> {
        let _guard = self.swap_lock.lock().map_err(DriverError::poisoned)?;
        let prior = self.active_bucket();
        let next = prior.flip();
        self.write_durable(&self.dir.join(ACTIVE_FILE), next.as_str().as_bytes())?;
        self.active.store(next.into(), Ordering::SeqCst);
        debug!(from = %prior, to = %next, "swapped active bucket");
        Ok(prior)
    }

    fn list_bucket(&self, bucket: Bucket) -> DriverResult<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for entry in WalkDir::new(self.bucket_dir(bucket)).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if check_hash(name) {
                hashes.push(ContentHash::from_hex(name)?);
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    fn purge_bucket(&self, bucket: Bucket) -> DriverResult<usize> {
        let removed = self.list_bucket(bucket)?.len();
        let dir = self.bucket_dir(bucket);
        fs::remove_dir_all(&dir)?;
        fs::create_dir(&dir)?;
        if self.config.sync.syncs() {
            fsync_dir(&self.dir)?;
        }
        debug!(%bucket, removed, "purged bucket");
        Ok(removed)
    }
}

impl std::fmt::Debug for FsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsDriver")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("active", &self.active_bucket())
            .finish()
    }
}
