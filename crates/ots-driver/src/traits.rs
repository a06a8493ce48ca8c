use ots_types::{Bucket, ContentHash};

use crate::error::{DriverError, DriverResult};
use crate::migrate::{migrate, MigrationReport};
use crate::walk::Reachability;

/// Content-addressed blob storage with one root pointer slot.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. The key is the content hash of the
///   bytes, so storing the same bytes twice is a no-op.
/// - `store` returns only after the blob is durable and discoverable.
/// - `store_root` is only called after everything reachable from the new
///   root is durable; the driver itself never checks this.
/// - The two buckets are disjoint namespaces. Exactly one is active for new
///   writes; the active flag is owned by the driver.
/// - All I/O errors are propagated, never silently ignored.
pub trait Driver: Send + Sync {
    /// Write `bytes` into `bucket` and return their content hash.
    fn store(&self, bytes: &[u8], bucket: Bucket) -> DriverResult<ContentHash>;

    /// Read a blob from one specific bucket.
    ///
    /// Returns `Ok(None)` if the bucket does not hold `hash`.
    fn load_in(&self, hash: &ContentHash, bucket: Bucket) -> DriverResult<Option<Vec<u8>>>;

    /// Whether `bucket` holds `hash`.
    fn contains(&self, hash: &ContentHash, bucket: Bucket) -> DriverResult<bool>;

    /// Overwrite the root pointer slot.
    fn store_root(&self, hash: &ContentHash) -> DriverResult<()>;

    /// Read the root pointer slot. `Ok(None)` for a store that was never
    /// published.
    fn load_root(&self) -> DriverResult<Option<ContentHash>>;

    /// The bucket new writes go to.
    fn active_bucket(&self) -> Bucket;

    /// Flip the active bucket and return the previously active one.
    fn swap_bucket(&self) -> DriverResult<Bucket>;

    /// All hashes held in `bucket`, sorted.
    fn list_bucket(&self, bucket: Bucket) -> DriverResult<Vec<ContentHash>>;

    /// Drop every blob in `bucket`. Returns the number of blobs removed.
    ///
    /// This is the compaction primitive. Purging a bucket that still holds
    /// reachable blobs corrupts the tree.
    fn purge_bucket(&self, bucket: Bucket) -> DriverResult<usize>;

    /// Write `bytes` into the active bucket.
    fn store_active(&self, bytes: &[u8]) -> DriverResult<ContentHash> {
        self.store(bytes, self.active_bucket())
    }

    /// Resolve `hash` searching `first`, then the other bucket.
    fn load_from(&self, hash: &ContentHash, first: Bucket) -> DriverResult<Option<Vec<u8>>> {
        if hash.is_blank() {
            return Err(DriverError::BlankHash);
        }
        for bucket in [first, first.flip()] {
            if let Some(bytes) = self.load_in(hash, bucket)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    /// Resolve `hash` in whichever bucket holds it, active bucket first.
    fn load(&self, hash: &ContentHash) -> DriverResult<Option<Vec<u8>>> {
        self.load_from(hash, self.active_bucket())
    }

    /// Whether either bucket holds `hash`.
    fn exists(&self, hash: &ContentHash) -> DriverResult<bool> {
        Ok(self.contains(hash, Bucket::A)? || self.contains(hash, Bucket::B)?)
    }

    /// Copy everything reachable from this driver's root into `target`,
    /// then point `target`'s root at the same hash.
    fn migrate_to<P>(&self, target: &dyn Driver, plan: &P) -> DriverResult<MigrationReport>
    where
        Self: Sized,
        P: Reachability,
    {
        migrate(self, target, plan)
    }
}
