//! Storage drivers for the object tree.
//!
//! A driver is a content-addressed blob store with two disjoint buckets and
//! a single root pointer slot. It never interprets blob contents: the tree
//! layer above serializes nodes to bytes, stores them, and publishes the
//! hash of the topmost node through [`Driver::store_root`].
//!
//! # Backends
//!
//! - [`MemoryDriver`] -- `HashMap`-based store for tests and embedding
//! - [`FsDriver`] -- one file per blob under `A/` and `B/`, plus a `root` file
//!
//! # Durability Rules
//!
//! 1. Blobs are immutable once written (content addressing guarantees this).
//! 2. Write-then-link: a blob is durable before anything refers to it.
//! 3. The root pointer is written last and replaced atomically.
//! 4. Hashes are verified on read; a mismatch is an error, not a miss.
//!
//! Traversal ([`walk`]) and cross-driver [`migrate`] take a
//! [`Reachability`] plan so that schema knowledge stays out of this crate.

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod migrate;
pub mod traits;
pub mod walk;

#[cfg(test)]
mod test_support;

pub use config::{open_driver, DriverConfig, FsConfig, StoreConfig, SyncMode};
pub use error::{DriverError, DriverResult};
pub use fs::FsDriver;
pub use memory::MemoryDriver;
pub use migrate::{migrate, MigrationReport};
pub use traits::Driver;
pub use walk::{reachable, walk, Reachability, WalkStats};
