//! The aggregate root: the only node whose hash is published to the driver.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ots_driver::{Driver, DriverError};
use ots_types::ContentHash;
use tracing::debug;

use crate::error::{TreeError, TreeResult};
use crate::node::{RootRecord, Role};

/// Fetch the bytes an index (or the root) claims to live at.
///
/// Anything other than a plain I/O failure means the index cannot be
/// enumerated and is reported as [`TreeError::CorruptIndex`].
pub(crate) fn resolve_index(
    driver: &dyn Driver,
    node: &'static str,
    hash: &ContentHash,
) -> TreeResult<Vec<u8>> {
    let corrupt = |reason: String| TreeError::CorruptIndex {
        node,
        hash: *hash,
        reason,
    };
    match driver.load(hash) {
        Ok(Some(bytes)) => Ok(bytes),
        Ok(None) => Err(corrupt("blob missing from both buckets".into())),
        Err(DriverError::Io(e)) => Err(DriverError::Io(e).into()),
        Err(e) => Err(corrupt(e.to_string())),
    }
}

struct RootState {
    hashes: BTreeMap<Role, ContentHash>,
    published: ContentHash,
}

/// Holds the index hash per role and publishes new roots.
///
/// The gate serializes tree writers against compaction: every mutating
/// operation holds it shared from its first blob write to root publication,
/// compaction holds it exclusively. Lock order is gate, then an index
/// node's state, then the root state.
pub(crate) struct RootNode {
    driver: Arc<dyn Driver>,
    gate: RwLock<()>,
    state: Mutex<RootState>,
}

impl std::fmt::Debug for RootNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootNode").finish_non_exhaustive()
    }
}

impl RootNode {
    pub(crate) fn open(driver: Arc<dyn Driver>) -> TreeResult<Self> {
        let (hashes, published) = match driver.load_root()? {
            None => (BTreeMap::new(), ContentHash::BLANK),
            Some(root) => {
                let bytes = resolve_index(&*driver, "root", &root)?;
                let corrupt = |reason: String| TreeError::CorruptIndex {
                    node: "root",
                    hash: root,
                    reason,
                };
                let record: RootRecord =
                    serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
                (record.to_hashes().map_err(corrupt)?, root)
            }
        };
        Ok(Self {
            driver,
            gate: RwLock::new(()),
            state: Mutex::new(RootState { hashes, published }),
        })
    }

    pub(crate) fn gate_read(&self) -> TreeResult<RwLockReadGuard<'_, ()>> {
        self.gate.read().map_err(TreeError::poisoned)
    }

    pub(crate) fn gate_write(&self) -> TreeResult<RwLockWriteGuard<'_, ()>> {
        self.gate.write().map_err(TreeError::poisoned)
    }

    fn lock(&self) -> TreeResult<MutexGuard<'_, RootState>> {
        self.state.lock().map_err(TreeError::poisoned)
    }

    /// Last saved hash of the index node for `role`; blank if never saved.
    pub(crate) fn index_hash(&self, role: Role) -> TreeResult<ContentHash> {
        Ok(self.lock()?.hashes.get(&role).copied().unwrap_or_default())
    }

    /// The published root, `None` for a tree that was never saved.
    pub(crate) fn hash(&self) -> TreeResult<Option<ContentHash>> {
        let published = self.lock()?.published;
        Ok((!published.is_blank()).then_some(published))
    }

    /// Record a new index hash and publish the resulting root.
    ///
    /// The index blob must already be durable. On failure the previous
    /// index hash is restored and the driver's root is unchanged.
    pub(crate) fn child_saved(&self, role: Role, hash: ContentHash) -> TreeResult<ContentHash> {
        let mut state = self.lock()?;
        let prior = state.hashes.insert(role, hash);
        match self.publish(&state.hashes) {
            Ok(root) => {
                state.published = root;
                Ok(root)
            }
            Err(e) => {
                match prior {
                    Some(prior) => state.hashes.insert(role, prior),
                    None => state.hashes.remove(&role),
                };
                Err(e)
            }
        }
    }

    fn publish(&self, hashes: &BTreeMap<Role, ContentHash>) -> TreeResult<ContentHash> {
        let record = RootRecord::from_hashes(hashes);
        let bytes = serde_json::to_vec(&record).map_err(|e| TreeError::Encode {
            kind: "root",
            reason: e.to_string(),
        })?;
        let root = self.driver.store_active(&bytes)?;
        self.driver.store_root(&root)?;
        debug!(root = %root.short_hex(), "published root");
        Ok(root)
    }
}
