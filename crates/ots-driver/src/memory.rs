use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use ots_crypto::ContentHasher;
use ots_types::{Bucket, ContentHash};
use tracing::debug;

use crate::error::{DriverError, DriverResult};
use crate::traits::Driver;

type BlobMap = HashMap<ContentHash, Vec<u8>>;

/// In-memory, HashMap-based driver.
///
/// Intended for tests and embedding. Each bucket is a `HashMap` behind a
/// shared `RwLock`; blobs are cloned on read and write. Writes can be made
/// to fail on demand to simulate a crash between blob durability and root
/// publication.
pub struct MemoryDriver {
    buckets: RwLock<[BlobMap; 2]>,
    root: RwLock<Option<ContentHash>>,
    active: AtomicBool,
    fail_blob_writes: AtomicBool,
    fail_root_writes: AtomicBool,
}

fn slot(bucket: Bucket) -> usize {
    match bucket {
        Bucket::A => 0,
        Bucket::B => 1,
    }
}

impl MemoryDriver {
    /// Create a new empty driver with bucket A active.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new([HashMap::new(), HashMap::new()]),
            root: RwLock::new(None),
            active: AtomicBool::new(false),
            fail_blob_writes: AtomicBool::new(false),
            fail_root_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `store` fail until reset.
    pub fn fail_blob_writes(&self, fail: bool) {
        self.fail_blob_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `store_root` fail until reset.
    pub fn fail_root_writes(&self, fail: bool) {
        self.fail_root_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of blobs in `bucket`.
    pub fn bucket_len(&self, bucket: Bucket) -> DriverResult<usize> {
        let buckets = self.buckets.read().map_err(DriverError::poisoned)?;
        Ok(buckets[slot(bucket)].len())
    }

    /// Number of blobs across both buckets (a blob in both counts twice).
    pub fn blob_count(&self) -> DriverResult<usize> {
        let buckets = self.buckets.read().map_err(DriverError::poisoned)?;
        Ok(buckets.iter().map(|m| m.len()).sum())
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MemoryDriver {
    fn store(&self, bytes: &[u8], bucket: Bucket) -> DriverResult<ContentHash> {
        if self.fail_blob_writes.load(Ordering::SeqCst) {
            return Err(DriverError::Injected("blob write"));
        }
        let hash = ContentHasher::BLOB.hash(bytes);
        let mut buckets = self.buckets.write().map_err(DriverError::poisoned)?;
        // Idempotent: the same hash always maps to the same bytes.
        buckets[slot(bucket)]
            .entry(hash)
            .or_insert_with(|| bytes.to_vec());
        debug!(hash = %hash.short_hex(), %bucket, len = bytes.len(), "stored blob");
        Ok(hash)
    }

    fn load_in(&self, hash: &ContentHash, bucket: Bucket) -> DriverResult<Option<Vec<u8>>> {
        if hash.is_blank() {
            return Err(DriverError::BlankHash);
        }
        let buckets = self.buckets.read().map_err(DriverError::poisoned)?;
        Ok(buckets[slot(bucket)].get(hash).cloned())
    }

    fn contains(&self, hash: &ContentHash, bucket: Bucket) -> DriverResult<bool> {
        let buckets = self.buckets.read().map_err(DriverError::poisoned)?;
        Ok(buckets[slot(bucket)].contains_key(hash))
    }

    fn store_root(&self, hash: &ContentHash) -> DriverResult<()> {
        if self.fail_root_writes.load(Ordering::SeqCst) {
            return Err(DriverError::Injected("root write"));
        }
        if hash.is_blank() {
            return Err(DriverError::BlankHash);
        }
        *self.root.write().map_err(DriverError::poisoned)? = Some(*hash);
        debug!(root = %hash.short_hex(), "published root");
        Ok(())
    }

    fn load_root(&self) -> DriverResult<Option<ContentHash>> {
        Ok(*self.root.read().map_err(DriverError::poisoned)?)
    }

    fn active_bucket(&self) -> Bucket {
        Bucket::from(self.active.load(Ordering::SeqCst))
    }

    fn swap_bucket(&self) -> DriverResult<Bucket> {
        let prior = self.active.fetch_xor(true, Ordering::SeqCst);
        Ok(Bucket::from(prior))
    }

    fn list_bucket(&self, bucket: Bucket) -> DriverResult<Vec<ContentHash>> {
        let buckets = self.buckets.read().map_err(DriverError::poisoned)?;
        let mut hashes: Vec<ContentHash> = buckets[slot(bucket)].keys().copied().collect();
        hashes.sort();
        Ok(hashes)
    }

    fn purge_bucket(&self, bucket: Bucket) -> DriverResult<usize> {
        let mut buckets = self.buckets.write().map_err(DriverError::poisoned)?;
        let removed = buckets[slot(bucket)].len();
        buckets[slot(bucket)].clear();
        debug!(%bucket, removed, "purged bucket");
        Ok(removed)
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("a", &self.bucket_len(Bucket::A).ok())
            .field("b", &self.bucket_len(Bucket::B).ok())
            .field("active", &self.active_bucket())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -----------------------------------------------------------------------
    // Store / load
    // -----------------------------------------------------------------------

    #[test]
    fn store_and_load() {
        let driver = MemoryDriver::new();
        let hash = driver.store(b"hello world", Bucket::A).unwrap();
        assert!(!hash.is_blank());
        assert_eq!(driver.load(&hash).unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn load_missing_returns_none() {
        let driver = MemoryDriver::new();
        let hash = ContentHasher::BLOB.hash(b"missing");
        assert!(driver.load(&hash).unwrap().is_none());
    }

    #[test]
    fn load_blank_is_an_error() {
        let driver = MemoryDriver::new();
        assert!(matches!(
            driver.load(&ContentHash::BLANK),
            Err(DriverError::BlankHash)
        ));
    }

    #[test]
    fn load_searches_both_buckets() {
        let driver = MemoryDriver::new();
        let hash = driver.store(b"in b", Bucket::B).unwrap();
        assert_eq!(driver.active_bucket(), Bucket::A);
        assert!(!driver.contains(&hash, Bucket::A).unwrap());
        assert_eq!(driver.load(&hash).unwrap().unwrap(), b"in b");
        assert!(driver.load_in(&hash, Bucket::A).unwrap().is_none());
        assert!(driver.exists(&hash).unwrap());
    }

    #[test]
    fn store_active_targets_active_bucket() {
        let driver = MemoryDriver::new();
        driver.swap_bucket().unwrap();
        let hash = driver.store_active(b"payload").unwrap();
        assert!(driver.contains(&hash, Bucket::B).unwrap());
        assert!(!driver.contains(&hash, Bucket::A).unwrap());
    }

    // -----------------------------------------------------------------------
    // Content addressing
    // -----------------------------------------------------------------------

    #[test]
    fn same_bytes_same_hash_single_copy() {
        let driver = MemoryDriver::new();
        let h1 = driver.store(b"identical", Bucket::A).unwrap();
        let h2 = driver.store(b"identical", Bucket::A).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(driver.bucket_len(Bucket::A).unwrap(), 1);
    }

    #[test]
    fn same_bytes_in_both_buckets() {
        let driver = MemoryDriver::new();
        let h1 = driver.store(b"x", Bucket::A).unwrap();
        let h2 = driver.store(b"x", Bucket::B).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(driver.blob_count().unwrap(), 2);
    }

    // -----------------------------------------------------------------------
    // Root pointer
    // -----------------------------------------------------------------------

    #[test]
    fn root_roundtrip() {
        let driver = MemoryDriver::new();
        assert!(driver.load_root().unwrap().is_none());
        let hash = driver.store(b"root blob", Bucket::A).unwrap();
        driver.store_root(&hash).unwrap();
        assert_eq!(driver.load_root().unwrap(), Some(hash));
    }

    #[test]
    fn injected_root_failure_keeps_previous_root() {
        let driver = MemoryDriver::new();
        let old = driver.store(b"old", Bucket::A).unwrap();
        driver.store_root(&old).unwrap();

        let new = driver.store(b"new", Bucket::A).unwrap();
        driver.fail_root_writes(true);
        assert!(matches!(
            driver.store_root(&new),
            Err(DriverError::Injected(_))
        ));
        assert_eq!(driver.load_root().unwrap(), Some(old));

        driver.fail_root_writes(false);
        driver.store_root(&new).unwrap();
        assert_eq!(driver.load_root().unwrap(), Some(new));
    }

    #[test]
    fn injected_blob_failure_stores_nothing() {
        let driver = MemoryDriver::new();
        driver.fail_blob_writes(true);
        assert!(driver.store(b"x", Bucket::A).is_err());
        assert_eq!(driver.blob_count().unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    #[test]
    fn swap_returns_prior_bucket() {
        let driver = MemoryDriver::new();
        assert_eq!(driver.swap_bucket().unwrap(), Bucket::A);
        assert_eq!(driver.active_bucket(), Bucket::B);
        assert_eq!(driver.swap_bucket().unwrap(), Bucket::B);
        assert_eq!(driver.active_bucket(), Bucket::A);
    }

    #[test]
    fn purge_empties_only_that_bucket() {
        let driver = MemoryDriver::new();
        let a = driver.store(b"a", Bucket::A).unwrap();
        let b = driver.store(b"b", Bucket::B).unwrap();
        assert_eq!(driver.purge_bucket(Bucket::A).unwrap(), 1);
        assert!(driver.load(&a).unwrap().is_none());
        assert!(driver.load(&b).unwrap().is_some());
    }

    #[test]
    fn list_bucket_is_sorted() {
        let driver = MemoryDriver::new();
        for data in [b"aaa", b"bbb", b"ccc"] {
            driver.store(data, Bucket::A).unwrap();
        }
        let hashes = driver.list_bucket(Bucket::A).unwrap();
        assert_eq!(hashes.len(), 3);
        for w in hashes.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert!(driver.list_bucket(Bucket::B).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writers_agree_on_hash() {
        use std::sync::Arc;
        use std::thread;

        let driver = Arc::new(MemoryDriver::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let driver = Arc::clone(&driver);
                thread::spawn(move || driver.store(b"shared data", Bucket::A).unwrap())
            })
            .collect();
        let hashes: Vec<ContentHash> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(hashes.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(driver.bucket_len(Bucket::A).unwrap(), 1);
    }

    #[test]
    fn debug_format() {
        let driver = MemoryDriver::new();
        driver.store(b"x", Bucket::A).unwrap();
        let debug = format!("{driver:?}");
        assert!(debug.contains("MemoryDriver"));
        assert!(debug.contains("active"));
    }

    #[test]
    fn poisoned_lock_is_reported_by_inspection_helpers() {
        let driver = std::sync::Arc::new(MemoryDriver::new());
        driver.store(b"x", Bucket::A).unwrap();
        let poisoner = std::sync::Arc::clone(&driver);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.buckets.write().unwrap();
            panic!("poison the bucket lock");
        })
        .join();

        assert!(matches!(driver.bucket_len(Bucket::A), Err(DriverError::LockPoisoned(_))));
        assert!(matches!(driver.blob_count(), Err(DriverError::LockPoisoned(_))));
        assert!(format!("{driver:?}").contains("None"));
    }

    proptest! {
        #[test]
        fn load_after_store_returns_same_bytes(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            in_b in any::<bool>(),
        ) {
            let driver = MemoryDriver::new();
            let hash = driver.store(&data, Bucket::from(in_b)).unwrap();
            prop_assert_eq!(hash, ContentHasher::BLOB.hash(&data));
            prop_assert_eq!(driver.load(&hash).unwrap().unwrap(), data);
        }
    }
}
