//! Foundation types for the object tree store (OTS).
//!
//! Every other OTS crate depends on `ots-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`]: Content-addressed blob key (32-byte digest, hex on the wire)
//! - [`Bucket`]: One of the two alternating blob namespaces used for compaction
//! - [`check_hash`]: Syntactic validation of a textual hash before lookup

pub mod bucket;
pub mod error;
pub mod hash;

pub use bucket::Bucket;
pub use error::TypeError;
pub use hash::{check_hash, ContentHash, HASH_HEX_LEN, HASH_LEN};
