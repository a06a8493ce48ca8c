//! Reachability traversal over hash-linked blobs.
//!
//! Drivers never interpret blob contents, so the caller supplies a
//! [`Reachability`] plan that knows how to find the hashes a blob refers
//! to. The walker handles queueing, de-duplication and loading.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use ots_types::ContentHash;

use crate::error::{DriverError, DriverResult};
use crate::traits::Driver;

/// Schema knowledge needed to follow references out of a blob.
pub trait Reachability {
    /// What a blob is, as far as following its links is concerned.
    type Kind: Copy + fmt::Debug;

    /// Kind of the blob named by the root pointer.
    fn root_kind(&self) -> Self::Kind;

    /// Hashes referenced by a blob of the given kind, with their kinds.
    fn children(
        &self,
        kind: Self::Kind,
        hash: &ContentHash,
        bytes: &[u8],
    ) -> DriverResult<Vec<(Self::Kind, ContentHash)>>;
}

/// Counters from a completed walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Distinct blobs visited.
    pub visited: usize,
    /// Sum of the visited blobs' sizes.
    pub bytes: u64,
}

/// Breadth-first traversal from `root`, calling `visit` once per distinct
/// reachable blob.
///
/// A referenced blob that is in neither bucket fails the walk with
/// [`DriverError::NotFound`]; blank references are skipped.
pub fn walk<P, F>(
    driver: &dyn Driver,
    root: &ContentHash,
    plan: &P,
    mut visit: F,
) -> DriverResult<WalkStats>
where
    P: Reachability,
    F: FnMut(P::Kind, &ContentHash, &[u8]) -> DriverResult<()>,
{
    let mut stats = WalkStats::default();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();

    if root.is_blank() {
        return Ok(stats);
    }
    seen.insert(*root);
    queue.push_back((plan.root_kind(), *root));

    while let Some((kind, hash)) = queue.pop_front() {
        let bytes = driver.load(&hash)?.ok_or(DriverError::NotFound(hash))?;
        visit(kind, &hash, &bytes)?;
        stats.visited += 1;
        stats.bytes += bytes.len() as u64;

        for (child_kind, child) in plan.children(kind, &hash, &bytes)? {
            if !child.is_blank() && seen.insert(child) {
                queue.push_back((child_kind, child));
            }
        }
    }

    Ok(stats)
}

/// Every hash reachable from `root`, in visit order.
pub fn reachable<P: Reachability>(
    driver: &dyn Driver,
    root: &ContentHash,
    plan: &P,
) -> DriverResult<Vec<ContentHash>> {
    let mut hashes = Vec::new();
    walk(driver, root, plan, |_, hash, _| {
        hashes.push(*hash);
        Ok(())
    })?;
    Ok(hashes)
}
