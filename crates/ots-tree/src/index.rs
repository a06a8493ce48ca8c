//! Generic index node: a map from logical ID to child metadata, with a
//! lazily populated cache of materialized children.
//!
//! Every mutation stores the changed child (if any) into the driver's active
//! bucket, then serializes the node's own entry map, stores that, and hands
//! the new hash to the aggregate root, which publishes a new root. A failure
//! at any step rolls the in-memory state back to what it was before the call;
//! blobs already written stay behind unreferenced until compaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use ots_crypto::ContentHasher;
use ots_driver::Driver;
use ots_types::ContentHash;
use tracing::{debug, warn};

use crate::editor::{Checkouts, Editor};
use crate::error::{TreeError, TreeResult};
use crate::node::{IndexRecord, Metadata, Role};
use crate::record::{self, Record};
use crate::root::{resolve_index, RootNode};

/// In-memory state of an index node, reachable only through the node's lock.
pub struct IndexState<R> {
    version: u32,
    root_hash: ContentHash,
    entries: BTreeMap<String, Metadata>,
    cache: HashMap<String, R>,
}

impl<R> IndexState<R> {
    fn empty(version: u32) -> Self {
        Self {
            version,
            root_hash: ContentHash::BLANK,
            entries: BTreeMap::new(),
            cache: HashMap::new(),
        }
    }

    fn restore(&mut self, id: &str, meta: Option<Metadata>, cached: Option<R>) {
        match meta {
            Some(meta) => self.entries.insert(id.to_string(), meta),
            None => self.entries.remove(id),
        };
        match cached {
            Some(record) => self.cache.insert(id.to_string(), record),
            None => self.cache.remove(id),
        };
    }
}

/// An index node holding records of type `R`.
pub struct IndexNode<R: Record> {
    role: Role,
    driver: Arc<dyn Driver>,
    root: Arc<RootNode>,
    state: Mutex<IndexState<R>>,
    checkouts: Checkouts,
}

impl<R: Record> std::fmt::Debug for IndexNode<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("IndexNode");
        s.field("role", &self.role).field("kind", &R::KIND);
        if let Ok(state) = self.state.try_lock() {
            s.field("version", &state.version)
                .field("entries", &state.entries.len())
                .field("root_hash", &state.root_hash);
        }
        s.finish()
    }
}

impl<R: Record> IndexNode<R> {
    /// Open the index for `role` at the hash the root currently records.
    pub(crate) fn open(role: Role, driver: Arc<dyn Driver>, root: Arc<RootNode>) -> TreeResult<Self> {
        let hash = root.index_hash(role)?;
        let state = Self::init(role, &*driver, hash)?;
        debug!(%role, entries = state.entries.len(), hash = %hash.short_hex(), "opened index");
        Ok(Self {
            role,
            driver,
            root,
            state: Mutex::new(state),
            checkouts: Checkouts::default(),
        })
    }

    /// Populate state from the blob at `hash`, or start empty for a blank hash.
    ///
    /// Older index versions are upgraded in memory and written at the
    /// current version on the next save.
    fn init(role: Role, driver: &dyn Driver, hash: ContentHash) -> TreeResult<IndexState<R>> {
        if hash.is_blank() {
            return Ok(IndexState::empty(R::INDEX_VERSION));
        }
        let corrupt = |reason: String| TreeError::CorruptIndex {
            node: role.as_str(),
            hash,
            reason,
        };
        let bytes = resolve_index(driver, role.as_str(), &hash)?;
        let record: IndexRecord =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if record.version > R::INDEX_VERSION {
            return Err(corrupt(format!(
                "version {} is newer than supported version {}",
                record.version,
                R::INDEX_VERSION
            )));
        }
        let entries = record.to_entries().map_err(corrupt)?;
        if record.version < R::INDEX_VERSION {
            debug!(%role, from = record.version, to = R::INDEX_VERSION, "upgraded index");
        }
        Ok(IndexState {
            version: R::INDEX_VERSION,
            root_hash: hash,
            entries,
            cache: HashMap::new(),
        })
    }

    fn lock(&self) -> TreeResult<MutexGuard<'_, IndexState<R>>> {
        self.state.lock().map_err(TreeError::poisoned)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Hash of this node's last saved form; blank if never saved.
    pub fn root_hash(&self) -> TreeResult<ContentHash> {
        Ok(self.lock()?.root_hash)
    }

    /// Schema version of this node.
    pub fn version(&self) -> TreeResult<u32> {
        Ok(self.lock()?.version)
    }

    pub fn len(&self) -> TreeResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> TreeResult<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    pub fn exists(&self, id: &str) -> TreeResult<bool> {
        Ok(self.lock()?.entries.contains_key(id))
    }

    pub fn metadata(&self, id: &str) -> TreeResult<Option<Metadata>> {
        Ok(self.lock()?.entries.get(id).cloned())
    }

    /// All IDs, sorted.
    pub fn list(&self) -> TreeResult<Vec<String>> {
        Ok(self.lock()?.entries.keys().cloned().collect())
    }

    /// IDs whose entry satisfies `filter`, sorted.
    pub fn list_filtered<F>(&self, mut filter: F) -> TreeResult<Vec<String>>
    where
        F: FnMut(&str, &Metadata) -> bool,
    {
        Ok(self
            .lock()?
            .entries
            .iter()
            .filter(|(id, meta)| filter(id, meta))
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Snapshot of every entry, sorted by ID.
    pub fn entries(&self) -> TreeResult<Vec<(String, Metadata)>> {
        Ok(self
            .lock()?
            .entries
            .iter()
            .map(|(id, meta)| (id.clone(), meta.clone()))
            .collect())
    }

    /// Resolve `id` to its stored bytes and alias.
    ///
    /// With `checking`, an absent ID is `Ok(None)`. Without it the caller
    /// asserts the ID exists, and absence is reported as
    /// [`TreeError::MissingEntry`]. An entry whose blob is gone is always an
    /// error.
    pub fn load(&self, id: &str, checking: bool) -> TreeResult<Option<(Vec<u8>, String)>> {
        let _gate = self.root.gate_read()?;
        let mut state = self.lock()?;
        let Some(meta) = state.entries.get_mut(id) else {
            if checking {
                return Ok(None);
            }
            warn!(role = %self.role, id, "unchecked load of absent entry");
            return Err(TreeError::MissingEntry {
                kind: R::KIND,
                id: id.to_string(),
            });
        };
        let bytes = self
            .driver
            .load(&meta.hash)?
            .ok_or_else(|| TreeError::MissingBlob {
                kind: R::KIND,
                id: id.to_string(),
                hash: meta.hash,
            })?;
        meta.size = bytes.len() as u64;
        Ok(Some((bytes, meta.alias.clone())))
    }

    /// The materialized record for `id`, decoding and caching it on first use.
    pub fn get(&self, id: &str) -> TreeResult<Option<R>> {
        let _gate = self.root.gate_read()?;
        let mut state = self.lock()?;
        if let Some(record) = state.cache.get(id) {
            return Ok(Some(record.clone()));
        }
        let Some(meta) = state.entries.get_mut(id) else {
            return Ok(None);
        };
        let bytes = self
            .driver
            .load(&meta.hash)?
            .ok_or_else(|| TreeError::MissingBlob {
                kind: R::KIND,
                id: id.to_string(),
                hash: meta.hash,
            })?;
        let record: R = record::decode(&meta.hash, &bytes)?;
        meta.size = bytes.len() as u64;
        meta.loaded = true;
        state.cache.insert(id.to_string(), record.clone());
        Ok(Some(record))
    }

    /// Store `record` under its own ID with the given alias.
    pub fn store(&self, record: R, alias: &str) -> TreeResult<ContentHash> {
        let id = record.id().to_string();
        self.store_as(&id, record, Some(alias.to_string()))
    }

    /// Store `record` under `id`. `alias: None` keeps the current alias.
    ///
    /// Validation runs before anything is written.
    pub(crate) fn store_as(
        &self,
        id: &str,
        mut record: R,
        alias: Option<String>,
    ) -> TreeResult<ContentHash> {
        record.upgrade();
        record::check(&record)?;
        let bytes = record::encode(&record)?;

        let _gate = self.root.gate_read()?;
        let mut state = self.lock()?;
        let hash = self.driver.store_active(&bytes)?;

        let alias = alias
            .or_else(|| state.entries.get(id).map(|m| m.alias.clone()))
            .unwrap_or_default();
        let mut meta = Metadata::new(hash, alias, bytes.len() as u64);
        meta.loaded = true;
        let prior_meta = state.entries.insert(id.to_string(), meta);
        let prior_cached = state.cache.insert(id.to_string(), record);

        if let Err(e) = self.save(&mut state) {
            state.restore(id, prior_meta, prior_cached);
            return Err(e);
        }
        debug!(role = %self.role, id, hash = %hash.short_hex(), "stored record");
        Ok(hash)
    }

    /// Remove `id`. Returns `false` if it was absent.
    ///
    /// The record's blob is not touched; it becomes unreachable and is
    /// reclaimed by the next compaction.
    pub fn delete(&self, id: &str) -> TreeResult<bool> {
        let _gate = self.root.gate_read()?;
        let mut state = self.lock()?;
        let Some(prior_meta) = state.entries.remove(id) else {
            return Ok(false);
        };
        let prior_cached = state.cache.remove(id);
        if let Err(e) = self.save(&mut state) {
            state.restore(id, Some(prior_meta), prior_cached);
            return Err(e);
        }
        debug!(role = %self.role, id, "deleted entry");
        Ok(true)
    }

    /// Replace the alias of `id`. Returns `false` if it was absent.
    pub fn set_alias(&self, id: &str, alias: &str) -> TreeResult<bool> {
        let _gate = self.root.gate_read()?;
        let mut state = self.lock()?;
        let Some(meta) = state.entries.get_mut(id) else {
            return Ok(false);
        };
        let prior = std::mem::replace(&mut meta.alias, alias.to_string());
        if let Err(e) = self.save(&mut state) {
            if let Some(meta) = state.entries.get_mut(id) {
                meta.alias = prior;
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Move the entry for `old` to `new`, keeping its hash and alias.
    ///
    /// Returns `false` if `old` is absent; fails with
    /// [`TreeError::AlreadyExists`] if `new` is taken, leaving both entries
    /// as they were. The stored record is not rewritten, so its own `id`
    /// field still names `old`.
    pub fn rename(&self, old: &str, new: &str) -> TreeResult<bool> {
        if new.is_empty() {
            return Err(TreeError::Validation {
                kind: R::KIND,
                reason: "empty id".into(),
            });
        }
        let _gate = self.root.gate_read()?;
        let mut state = self.lock()?;
        if !state.entries.contains_key(old) {
            return Ok(false);
        }
        if old == new {
            return Ok(true);
        }
        if state.entries.contains_key(new) {
            return Err(TreeError::AlreadyExists {
                kind: R::KIND,
                id: new.to_string(),
            });
        }
        let meta = state.entries.remove(old);
        let cached = state.cache.remove(old);
        state.restore(new, meta.clone(), cached.clone());
        if let Err(e) = self.save(&mut state) {
            state.restore(new, None, None);
            state.restore(old, meta, cached);
            return Err(e);
        }
        debug!(role = %self.role, old, new, "renamed entry");
        Ok(true)
    }

    /// Exclusive mutable access to the record for `id`, created blank if
    /// absent. Blocks while another editor holds the same ID.
    pub fn checkout(&self, id: &str) -> TreeResult<Editor<'_, R>> {
        if id.is_empty() {
            return Err(TreeError::Validation {
                kind: R::KIND,
                reason: "empty id".into(),
            });
        }
        let slot = self.checkouts.acquire(id)?;
        let existing = self.get(id)?;
        let created = existing.is_none();
        let record = existing.unwrap_or_else(|| R::blank(id));
        Ok(Editor::new(self, slot, record, created))
    }

    /// Persist this node and cascade to the root.
    ///
    /// Loaded children are re-encoded first so that in-memory upgrades
    /// reach storage. The node's version and hash only change once the root
    /// is published; on failure the refreshed children point back at their
    /// published blobs.
    pub(crate) fn save(&self, state: &mut IndexState<R>) -> TreeResult<ContentHash> {
        let refreshed = self.refresh_loaded(state)?;
        match self.publish(state) {
            Ok(hash) => Ok(hash),
            Err(e) => {
                for (id, hash, size) in refreshed {
                    if let Some(meta) = state.entries.get_mut(&id) {
                        meta.hash = hash;
                        meta.size = size;
                    }
                }
                Err(e)
            }
        }
    }

    fn publish(&self, state: &mut IndexState<R>) -> TreeResult<ContentHash> {
        let record = IndexRecord::from_entries(R::INDEX_VERSION, &state.entries);
        record.to_entries().map_err(|reason| TreeError::Validation {
            kind: self.role.as_str(),
            reason,
        })?;
        let bytes = serde_json::to_vec(&record).map_err(|e| TreeError::Encode {
            kind: self.role.as_str(),
            reason: e.to_string(),
        })?;
        let hash = self.driver.store_active(&bytes)?;
        self.root.child_saved(self.role, hash)?;

        state.version = R::INDEX_VERSION;
        state.root_hash = hash;
        debug!(role = %self.role, hash = %hash.short_hex(), entries = state.entries.len(), "saved index");
        Ok(hash)
    }

    /// Store every loaded child whose encoding no longer matches its blob.
    ///
    /// Entries are only touched once all stores succeed. Returns the prior
    /// `(id, hash, size)` of each entry that moved.
    fn refresh_loaded(&self, state: &mut IndexState<R>) -> TreeResult<Vec<(String, ContentHash, u64)>> {
        let mut moved = Vec::new();
        for (id, meta) in state.entries.iter().filter(|(_, m)| m.loaded) {
            let Some(record) = state.cache.get(id) else {
                continue;
            };
            let bytes = record::encode(record)?;
            if !ContentHasher::BLOB.verify(&bytes, &meta.hash) {
                let hash = self.driver.store_active(&bytes)?;
                moved.push((id.clone(), hash, bytes.len() as u64));
            }
        }

        let mut prior = Vec::with_capacity(moved.len());
        for (id, hash, size) in moved {
            if let Some(meta) = state.entries.get_mut(&id) {
                prior.push((id, meta.hash, meta.size));
                meta.hash = hash;
                meta.size = size;
            }
        }
        Ok(prior)
    }
}

/// Role-erased access to an index node, for callers that pick the node at
/// runtime.
pub trait AnyIndex: Send + Sync {
    fn role(&self) -> Role;
    fn kind(&self) -> &'static str;
    fn entries(&self) -> TreeResult<Vec<(String, Metadata)>>;
    fn exists(&self, id: &str) -> TreeResult<bool>;
    fn load(&self, id: &str, checking: bool) -> TreeResult<Option<(Vec<u8>, String)>>;
    fn delete(&self, id: &str) -> TreeResult<bool>;
    fn set_alias(&self, id: &str, alias: &str) -> TreeResult<bool>;
    fn rename(&self, old: &str, new: &str) -> TreeResult<bool>;
}

impl<R: Record> AnyIndex for IndexNode<R> {
    fn role(&self) -> Role {
        self.role
    }

    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn entries(&self) -> TreeResult<Vec<(String, Metadata)>> {
        IndexNode::entries(self)
    }

    fn exists(&self, id: &str) -> TreeResult<bool> {
        IndexNode::exists(self, id)
    }

    fn load(&self, id: &str, checking: bool) -> TreeResult<Option<(Vec<u8>, String)>> {
        IndexNode::load(self, id, checking)
    }

    fn delete(&self, id: &str) -> TreeResult<bool> {
        IndexNode::delete(self, id)
    }

    fn set_alias(&self, id: &str, alias: &str) -> TreeResult<bool> {
        IndexNode::set_alias(self, id, alias)
    }

    fn rename(&self, old: &str, new: &str) -> TreeResult<bool> {
        IndexNode::rename(self, old, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{IssuerProfile, Thread};
    use ots_driver::MemoryDriver;

    fn node<R: Record>(role: Role) -> (Arc<MemoryDriver>, IndexNode<R>) {
        let driver = Arc::new(MemoryDriver::new());
        let dyn_driver: Arc<dyn Driver> = driver.clone();
        let root = Arc::new(RootNode::open(dyn_driver.clone()).unwrap());
        (driver, IndexNode::open(role, dyn_driver, root).unwrap())
    }

    fn issuer(id: &str) -> IssuerProfile {
        IssuerProfile::new(id, format!("nym-{id}"))
    }

    // ---------------------------------------------------------------
    // Store / load
    // ---------------------------------------------------------------

    #[test]
    fn empty_node_is_blank() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        assert!(idx.is_empty().unwrap());
        assert!(idx.root_hash().unwrap().is_blank());
        assert_eq!(idx.version().unwrap(), IssuerProfile::INDEX_VERSION);
    }

    #[test]
    fn store_then_load_returns_bytes_and_alias() {
        let (driver, idx) = node::<IssuerProfile>(Role::Issuers);
        let record = issuer("X1");
        let hash = idx.store(record.clone(), "Bank").unwrap();

        let (bytes, alias) = idx.load("X1", true).unwrap().unwrap();
        assert_eq!(bytes, record::encode(&record).unwrap());
        assert_eq!(alias, "Bank");
        assert_eq!(driver.load(&hash).unwrap().unwrap(), bytes);
        assert!(!idx.root_hash().unwrap().is_blank());
        assert!(driver.load_root().unwrap().is_some());
    }

    #[test]
    fn load_checking_semantics() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        assert!(idx.load("nope", true).unwrap().is_none());
        let err = idx.load("nope", false).unwrap_err();
        assert!(matches!(err, TreeError::MissingEntry { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn get_caches_and_marks_loaded() {
        let (driver, idx) = node::<IssuerProfile>(Role::Issuers);
        idx.store(issuer("X1"), "").unwrap();

        // Reopen so the cache is cold.
        let dyn_driver: Arc<dyn Driver> = driver;
        let root = Arc::new(RootNode::open(dyn_driver.clone()).unwrap());
        let idx = IndexNode::<IssuerProfile>::open(Role::Issuers, dyn_driver, root).unwrap();
        assert!(!idx.metadata("X1").unwrap().unwrap().loaded);
        assert_eq!(idx.metadata("X1").unwrap().unwrap().size, 0);

        let got = idx.get("X1").unwrap().unwrap();
        assert_eq!(got, issuer("X1"));
        let meta = idx.metadata("X1").unwrap().unwrap();
        assert!(meta.loaded);
        assert!(meta.size > 0);
        assert!(idx.get("X2").unwrap().is_none());
    }

    #[test]
    fn invalid_record_writes_nothing() {
        let (driver, idx) = node::<IssuerProfile>(Role::Issuers);
        let err = idx.store(IssuerProfile::blank("X1"), "").unwrap_err();
        assert!(matches!(err, TreeError::Validation { .. }));
        assert_eq!(driver.blob_count().unwrap(), 0);
        assert!(!idx.exists("X1").unwrap());
    }

    #[test]
    fn store_keeps_alias_when_none() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        idx.store(issuer("X1"), "Bank").unwrap();
        idx.store_as("X1", issuer("X1").with_display_name("B"), None)
            .unwrap();
        assert_eq!(idx.metadata("X1").unwrap().unwrap().alias, "Bank");
    }

    // ---------------------------------------------------------------
    // Delete / alias / rename
    // ---------------------------------------------------------------

    #[test]
    fn delete_keeps_blob() {
        let (driver, idx) = node::<IssuerProfile>(Role::Issuers);
        let hash = idx.store(issuer("X1"), "Bank").unwrap();
        assert!(idx.delete("X1").unwrap());
        assert!(!idx.delete("X1").unwrap());
        assert!(idx.load("X1", true).unwrap().is_none());
        assert!(driver.load(&hash).unwrap().is_some());
    }

    #[test]
    fn set_alias_preserves_hash() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        let hash = idx.store(issuer("X1"), "Bank").unwrap();
        assert!(idx.set_alias("X1", "Treasury").unwrap());
        let meta = idx.metadata("X1").unwrap().unwrap();
        assert_eq!(meta.alias, "Treasury");
        assert_eq!(meta.hash, hash);
        assert!(!idx.set_alias("X9", "x").unwrap());
    }

    #[test]
    fn rename_moves_entry() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        let hash = idx.store(issuer("X1"), "Bank").unwrap();
        assert!(idx.rename("X1", "X2").unwrap());
        assert!(!idx.exists("X1").unwrap());
        let meta = idx.metadata("X2").unwrap().unwrap();
        assert_eq!(meta.hash, hash);
        assert_eq!(meta.alias, "Bank");
        assert!(!idx.rename("X1", "X3").unwrap());
    }

    #[test]
    fn rename_onto_existing_fails_unchanged() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        let h1 = idx.store(issuer("X1"), "one").unwrap();
        let h2 = idx.store(issuer("X2"), "two").unwrap();
        let root = idx.root_hash().unwrap();

        let err = idx.rename("X1", "X2").unwrap_err();
        assert!(matches!(err, TreeError::AlreadyExists { .. }));
        assert_eq!(idx.metadata("X1").unwrap().unwrap().hash, h1);
        assert_eq!(idx.metadata("X2").unwrap().unwrap().hash, h2);
        assert_eq!(idx.root_hash().unwrap(), root);
    }

    #[test]
    fn list_filtered_by_alias() {
        let (_, idx) = node::<IssuerProfile>(Role::Issuers);
        idx.store(issuer("a"), "keep").unwrap();
        idx.store(issuer("b"), "").unwrap();
        idx.store(issuer("c"), "keep").unwrap();
        assert_eq!(idx.list().unwrap(), ["a", "b", "c"]);
        let kept = idx.list_filtered(|_, m| m.alias == "keep").unwrap();
        assert_eq!(kept, ["a", "c"]);
    }

    // ---------------------------------------------------------------
    // Failure handling
    // ---------------------------------------------------------------

    #[test]
    fn failed_root_publish_rolls_back() {
        let (driver, idx) = node::<IssuerProfile>(Role::Issuers);
        idx.store(issuer("X1"), "").unwrap();
        let index_hash = idx.root_hash().unwrap();
        let root = driver.load_root().unwrap();

        driver.fail_root_writes(true);
        assert!(idx.store(issuer("X2"), "").unwrap_err().is_io());
        assert!(idx.delete("X1").is_err());
        assert!(idx.rename("X1", "X3").is_err());
        assert!(idx.set_alias("X1", "new").is_err());

        assert!(!idx.exists("X2").unwrap());
        assert!(idx.exists("X1").unwrap());
        assert!(!idx.exists("X3").unwrap());
        assert_eq!(idx.metadata("X1").unwrap().unwrap().alias, "");
        assert_eq!(idx.root_hash().unwrap(), index_hash);
        assert_eq!(driver.load_root().unwrap(), root);
    }

    #[test]
    fn missing_index_blob_is_corrupt_index() {
        let (driver, idx) = node::<IssuerProfile>(Role::Issuers);
        idx.store(issuer("X1"), "").unwrap();
        driver.purge_bucket(ots_types::Bucket::A).unwrap();

        let dyn_driver: Arc<dyn Driver> = driver;
        let err = RootNode::open(dyn_driver).unwrap_err();
        assert!(matches!(err, TreeError::CorruptIndex { node: "root", .. }));
    }

    #[test]
    fn missing_leaf_blob_is_reported() {
        let (driver, idx) = node::<Thread>(Role::Threads);
        let leaf = idx.store(Thread::new("t1", ["alice"]), "").unwrap();
        let index_hash = idx.root_hash().unwrap();

        // Rebuild a driver that has the index but not the leaf.
        let other = Arc::new(MemoryDriver::new());
        let index_bytes = driver.load(&index_hash).unwrap().unwrap();
        other.store(&index_bytes, ots_types::Bucket::A).unwrap();
        let root_bytes = driver.load(&driver.load_root().unwrap().unwrap()).unwrap().unwrap();
        let root_hash = other.store(&root_bytes, ots_types::Bucket::A).unwrap();
        other.store_root(&root_hash).unwrap();

        let dyn_driver: Arc<dyn Driver> = other;
        let root = Arc::new(RootNode::open(dyn_driver.clone()).unwrap());
        let idx = IndexNode::<Thread>::open(Role::Threads, dyn_driver, root).unwrap();
        let err = idx.load("t1", true).unwrap_err();
        assert!(matches!(err, TreeError::MissingBlob { hash, .. } if hash == leaf));
        assert!(err.is_recoverable());
    }

    // ---------------------------------------------------------------
    // Versioning
    // ---------------------------------------------------------------

    #[test]
    fn v1_index_is_upgraded_with_entries_unchanged() {
        let driver = Arc::new(MemoryDriver::new());
        let leaf = driver
            .store(&record::encode(&issuer("X1")).unwrap(), ots_types::Bucket::A)
            .unwrap();
        let v1 = format!(
            r#"{{"version":1,"entries":[{{"item_id":"X1","hash":"{}"}}]}}"#,
            leaf.to_hex()
        );
        let index_hash = driver.store(v1.as_bytes(), ots_types::Bucket::A).unwrap();
        let root_json = format!(
            r#"{{"version":1,"nodes":[{{"role":"issuers","hash":"{}"}}]}}"#,
            index_hash.to_hex()
        );
        let root_hash = driver.store(root_json.as_bytes(), ots_types::Bucket::A).unwrap();
        driver.store_root(&root_hash).unwrap();

        let dyn_driver: Arc<dyn Driver> = driver.clone();
        let root = Arc::new(RootNode::open(dyn_driver.clone()).unwrap());
        let idx = IndexNode::<IssuerProfile>::open(Role::Issuers, dyn_driver, root).unwrap();
        assert_eq!(idx.version().unwrap(), 2);
        assert_eq!(idx.list().unwrap(), ["X1"]);
        assert_eq!(idx.metadata("X1").unwrap().unwrap().hash, leaf);
        // No save happened on load.
        assert_eq!(driver.load_root().unwrap(), Some(root_hash));
    }

    #[test]
    fn future_index_version_is_corrupt() {
        let driver = Arc::new(MemoryDriver::new());
        let index_hash = driver
            .store(br#"{"version":99,"entries":[]}"#, ots_types::Bucket::A)
            .unwrap();
        let root_json = format!(
            r#"{{"version":1,"nodes":[{{"role":"threads","hash":"{}"}}]}}"#,
            index_hash.to_hex()
        );
        let root_hash = driver.store(root_json.as_bytes(), ots_types::Bucket::A).unwrap();
        driver.store_root(&root_hash).unwrap();

        let dyn_driver: Arc<dyn Driver> = driver;
        let root = Arc::new(RootNode::open(dyn_driver.clone()).unwrap());
        let err = IndexNode::<Thread>::open(Role::Threads, dyn_driver, root).unwrap_err();
        assert!(matches!(err, TreeError::CorruptIndex { node: "threads", .. }));
    }

    #[test]
    fn upgraded_leaf_is_rewritten_on_next_save() {
        let driver = Arc::new(MemoryDriver::new());
        let dyn_driver: Arc<dyn Driver> = driver.clone();
        let root = Arc::new(RootNode::open(dyn_driver.clone()).unwrap());
        let idx = IndexNode::<IssuerProfile>::open(Role::Issuers, dyn_driver, root).unwrap();

        // Plant a v1 leaf directly under an entry.
        let v1 = br#"{"version":1,"id":"X1","nym_id":"n"}"#;
        let old = driver.store(v1, ots_types::Bucket::A).unwrap();
        {
            let mut state = idx.lock().unwrap();
            state.entries.insert("X1".into(), Metadata::new(old, "", 0));
            idx.save(&mut state).unwrap();
        }

        assert_eq!(idx.get("X1").unwrap().unwrap().version, 2);
        idx.store(issuer("X2"), "").unwrap();
        let new = idx.metadata("X1").unwrap().unwrap().hash;
        assert_ne!(new, old);
        let bytes = driver.load(&new).unwrap().unwrap();
        let stored: IssuerProfile = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored.version, 2);
    }
}
