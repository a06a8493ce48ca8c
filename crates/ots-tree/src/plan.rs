//! How to follow hash references through a stored tree.

use serde::Serialize;

use ots_driver::{DriverError, DriverResult, Reachability};
use ots_types::ContentHash;

use crate::error::TreeResult;
use crate::node::{IndexRecord, Role, RootRecord};
use crate::record::{self, Record};
use crate::records::{IssuerProfile, ServerDescriptor, Thread};

/// What a blob in the tree is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "node", content = "role", rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Index(Role),
    Leaf(Role),
}

/// Reachability plan for the aggregate tree: root record, then one index
/// node per role, then leaf records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreePlan;

impl Reachability for TreePlan {
    type Kind = NodeKind;

    fn root_kind(&self) -> NodeKind {
        NodeKind::Root
    }

    fn children(
        &self,
        kind: NodeKind,
        hash: &ContentHash,
        bytes: &[u8],
    ) -> DriverResult<Vec<(NodeKind, ContentHash)>> {
        let corrupt = |reason: String| DriverError::CorruptBlob {
            hash: *hash,
            reason,
        };
        match kind {
            NodeKind::Root => {
                let record: RootRecord =
                    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
                Ok(record
                    .to_hashes()
                    .map_err(corrupt)?
                    .into_iter()
                    .map(|(role, h)| (NodeKind::Index(role), h))
                    .collect())
            }
            NodeKind::Index(role) => {
                let record: IndexRecord =
                    serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
                if record.version > index_version(role) {
                    return Err(corrupt(format!(
                        "{role} index version {} is unsupported",
                        record.version
                    )));
                }
                Ok(record
                    .child_hashes()
                    .map_err(corrupt)?
                    .into_iter()
                    .map(|h| (NodeKind::Leaf(role), h))
                    .collect())
            }
            NodeKind::Leaf(_) => Ok(Vec::new()),
        }
    }
}

fn index_version(role: Role) -> u32 {
    match role {
        Role::Servers => ServerDescriptor::INDEX_VERSION,
        Role::Issuers => IssuerProfile::INDEX_VERSION,
        Role::Threads => Thread::INDEX_VERSION,
    }
}

/// Decode and validate a leaf stored under `role`.
pub fn check_leaf(role: Role, hash: &ContentHash, bytes: &[u8]) -> TreeResult<()> {
    fn check<R: Record>(hash: &ContentHash, bytes: &[u8]) -> TreeResult<()> {
        let record: R = record::decode(hash, bytes)?;
        record::check(&record)
    }
    match role {
        Role::Servers => check::<ServerDescriptor>(hash, bytes),
        Role::Issuers => check::<IssuerProfile>(hash, bytes),
        Role::Threads => check::<Thread>(hash, bytes),
    }
}
