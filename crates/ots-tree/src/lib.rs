//! Hash-linked tree of versioned records over a storage driver.
//!
//! The tree is a fixed set of index nodes (servers, issuers, threads) under
//! one aggregate root. Each index node maps logical IDs to the content hash
//! and alias of a leaf record. The root hash published through the driver
//! is the only mutable pointer; everything else is reachable by following
//! hashes from it.
//!
//! # Key Types
//!
//! - [`Tree`]: the aggregate root, compaction, migration and verification
//! - [`IndexNode`]: generic index over one [`Record`] type
//! - [`Editor`]: exclusive checkout of one record, committed on drop
//! - [`Metadata`]: per-child `{hash, alias, size, loaded}`
//! - [`TreePlan`]: reachability plan used by compaction and migration
//!
//! # Write Ordering
//!
//! 1. The changed leaf is stored into the active bucket.
//! 2. The index node's new form is stored.
//! 3. The aggregate root record is stored.
//! 4. Only then is the root pointer replaced.
//!
//! A failure at any step leaves the published root, and the in-memory
//! state, as they were.

pub mod background;
pub mod editor;
pub mod error;
pub mod index;
pub mod node;
pub mod plan;
pub mod record;
pub mod records;
mod root;
pub mod tree;

pub use editor::Editor;
pub use error::{ErrorKind, TreeError, TreeResult};
pub use index::{AnyIndex, IndexNode, IndexState};
pub use node::{IndexEntry, IndexRecord, Metadata, Role, RootEntry, RootRecord};
pub use plan::{check_leaf, NodeKind, TreePlan};
pub use record::Record;
pub use records::{Endpoint, IssuerProfile, ServerDescriptor, Thread, ThreadItem};
pub use tree::{CompactionReport, Problem, Tree, VerifyReport};
