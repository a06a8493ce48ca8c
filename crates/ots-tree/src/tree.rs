use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use ots_crypto::ContentHasher;
use ots_driver::{walk, Driver, MigrationReport, Reachability};
use ots_types::{Bucket, ContentHash};
use tracing::{info, warn};

use crate::error::TreeResult;
use crate::index::{AnyIndex, IndexNode};
use crate::node::Role;
use crate::plan::{check_leaf, NodeKind, TreePlan};
use crate::records::{IssuerProfile, ServerDescriptor, Thread};
use crate::root::RootNode;

/// Outcome of a compaction pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Bucket that was emptied.
    pub retired: Bucket,
    /// Bucket now receiving writes and holding the live tree.
    pub active: Bucket,
    /// Distinct blobs reachable from the root.
    pub reachable: usize,
    /// Reachable blobs that had to be copied into the active bucket.
    pub copied: usize,
    /// Bytes in reachable blobs.
    pub bytes: u64,
    /// Blobs removed with the retired bucket.
    pub purged: usize,
}

/// One defect found by [`Tree::verify`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub hash: ContentHash,
    pub kind: NodeKind,
    pub reason: String,
}

/// Result of an integrity check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub root: Option<ContentHash>,
    /// Blobs read and checked.
    pub checked: usize,
    pub bytes: u64,
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// The aggregate object tree: one index node per [`Role`], reachable from
/// the driver's root pointer.
pub struct Tree {
    driver: Arc<dyn Driver>,
    root: Arc<RootNode>,
    servers: IndexNode<ServerDescriptor>,
    issuers: IndexNode<IssuerProfile>,
    threads: IndexNode<Thread>,
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("servers", &self.servers)
            .field("issuers", &self.issuers)
            .field("threads", &self.threads)
            .finish()
    }
}

impl Tree {
    /// Open the tree published in `driver`, or an empty one.
    ///
    /// Index nodes are decoded eagerly; leaf records are materialized on
    /// first access. A root or index whose bytes are missing or malformed
    /// fails with [`TreeError::CorruptIndex`](crate::TreeError::CorruptIndex).
    pub fn open(driver: Arc<dyn Driver>) -> TreeResult<Self> {
        let root = Arc::new(RootNode::open(Arc::clone(&driver))?);
        let tree = Self {
            servers: IndexNode::open(Role::Servers, Arc::clone(&driver), Arc::clone(&root))?,
            issuers: IndexNode::open(Role::Issuers, Arc::clone(&driver), Arc::clone(&root))?,
            threads: IndexNode::open(Role::Threads, Arc::clone(&driver), Arc::clone(&root))?,
            root,
            driver,
        };
        info!(
            root = %tree.root.hash()?.map(|h| h.short_hex()).unwrap_or_else(|| "empty".into()),
            active = %tree.driver.active_bucket(),
            "opened tree"
        );
        Ok(tree)
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn servers(&self) -> &IndexNode<ServerDescriptor> {
        &self.servers
    }

    pub fn issuers(&self) -> &IndexNode<IssuerProfile> {
        &self.issuers
    }

    pub fn threads(&self) -> &IndexNode<Thread> {
        &self.threads
    }

    /// The index node for `role`, with its record type erased.
    pub fn index(&self, role: Role) -> &dyn AnyIndex {
        match role {
            Role::Servers => &self.servers,
            Role::Issuers => &self.issuers,
            Role::Threads => &self.threads,
        }
    }

    /// The published root hash, `None` before the first save.
    pub fn root_hash(&self) -> TreeResult<Option<ContentHash>> {
        self.root.hash()
    }

    /// Reclaim every blob not reachable from the current root.
    ///
    /// Flips the active bucket, copies the reachable tree into it,
    /// republishes the root, then purges the retired bucket. Writers are
    /// held off for the duration. If the copy fails the retired bucket is
    /// left intact and the tree stays readable from both buckets.
    pub fn compact(&self) -> TreeResult<CompactionReport> {
        let _gate = self.root.gate_write()?;
        let retired = self.driver.swap_bucket()?;
        let active = retired.flip();

        let mut report = CompactionReport {
            retired,
            active,
            reachable: 0,
            copied: 0,
            bytes: 0,
            purged: 0,
        };

        if let Some(root) = self.root.hash()? {
            let driver = &*self.driver;
            let mut copied = 0;
            let stats = walk(driver, &root, &TreePlan, |_, hash, bytes| {
                if !driver.contains(hash, active)? {
                    driver.store(bytes, active)?;
                    copied += 1;
                }
                Ok(())
            })
            .inspect_err(|e| warn!(error = %e, %retired, "compaction copy failed; retired bucket kept"))?;
            driver.store_root(&root)?;
            report.reachable = stats.visited;
            report.bytes = stats.bytes;
            report.copied = copied;
        }

        report.purged = self.driver.purge_bucket(retired)?;
        info!(
            %retired,
            %active,
            reachable = report.reachable,
            copied = report.copied,
            purged = report.purged,
            "compaction complete"
        );
        Ok(report)
    }

    /// Copy the reachable tree and root pointer into `target`.
    ///
    /// Compaction is held off while the copy runs; writers are not.
    pub fn migrate(&self, target: &dyn Driver) -> TreeResult<MigrationReport> {
        let _gate = self.root.gate_read()?;
        Ok(ots_driver::migrate(&*self.driver, target, &TreePlan)?)
    }

    /// Walk the whole tree, re-hashing and decoding every blob.
    ///
    /// Problems are collected rather than failing fast; the error path is
    /// reserved for lock failures.
    pub fn verify(&self) -> TreeResult<VerifyReport> {
        let _gate = self.root.gate_read()?;
        let mut report = VerifyReport {
            root: self.root.hash()?,
            ..VerifyReport::default()
        };
        let Some(root) = report.root else {
            return Ok(report);
        };

        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([(NodeKind::Root, root)]);
        while let Some((kind, hash)) = queue.pop_front() {
            let mut problem = |reason: String| {
                report.problems.push(Problem { hash, kind, reason });
            };
            let bytes = match self.driver.load(&hash) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    problem("blob missing from both buckets".into());
                    continue;
                }
                Err(e) => {
                    problem(e.to_string());
                    continue;
                }
            };
            report.checked += 1;
            report.bytes += bytes.len() as u64;

            let computed = ContentHasher::BLOB.hash(&bytes);
            if computed != hash {
                problem(format!("content hashes to {computed}"));
                continue;
            }
            match kind {
                NodeKind::Leaf(role) => {
                    if let Err(e) = check_leaf(role, &hash, &bytes) {
                        problem(e.to_string());
                    }
                }
                _ => match TreePlan.children(kind, &hash, &bytes) {
                    Ok(children) => {
                        for (child_kind, child) in children {
                            if seen.insert(child) {
                                queue.push_back((child_kind, child));
                            }
                        }
                    }
                    Err(e) => problem(e.to_string()),
                },
            }
        }

        if !report.is_clean() {
            warn!(problems = report.problems.len(), "tree verification found problems");
        }
        Ok(report)
    }
}
