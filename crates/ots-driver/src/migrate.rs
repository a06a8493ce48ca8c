use ots_types::ContentHash;
use serde::Serialize;
use tracing::info;

use crate::error::{DriverError, DriverResult};
use crate::traits::Driver;
use crate::walk::{walk, Reachability};

/// Outcome of a completed migration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Root published on the target, `None` if the source was empty.
    pub root: Option<ContentHash>,
    /// Distinct blobs copied (including ones the target already held).
    pub blobs_copied: usize,
    /// Bytes copied.
    pub bytes_copied: u64,
}

/// Reproduce every blob reachable from `source`'s root in `target`, then
/// point `target`'s root at the same hash.
///
/// Content addressing keeps keys stable across backends, so each blob lands
/// under the hash it had in `source`. Any unreadable or unwritable blob
/// aborts the copy before `target`'s root is touched; blobs already copied
/// stay behind unreferenced. Re-running after a failure converges on the
/// same end state.
pub fn migrate<P: Reachability>(
    source: &dyn Driver,
    target: &dyn Driver,
    plan: &P,
) -> DriverResult<MigrationReport> {
    let Some(root) = source.load_root().map_err(abort)? else {
        info!("source store is empty; nothing to migrate");
        return Ok(MigrationReport::default());
    };

    let bucket = target.active_bucket();
    let stats = walk(source, &root, plan, |_, hash, bytes| {
        let stored = target.store(bytes, bucket)?;
        if stored != *hash {
            return Err(DriverError::HashMismatch {
                hash: *hash,
                computed: stored,
            });
        }
        Ok(())
    })
    .map_err(abort)?;

    target.store_root(&root).map_err(abort)?;

    info!(
        root = %root.short_hex(),
        blobs = stats.visited,
        bytes = stats.bytes,
        "migration complete"
    );
    Ok(MigrationReport {
        root: Some(root),
        blobs_copied: stats.visited,
        bytes_copied: stats.bytes,
    })
}

fn abort(e: DriverError) -> DriverError {
    DriverError::Migration(Box::new(e))
}
