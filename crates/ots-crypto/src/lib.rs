//! Content hashing for the object tree store.
//!
//! Every blob key in OTS is a domain-separated BLAKE3 digest of the blob's
//! bytes. The digest is the only thing the storage drivers know about a
//! blob; they never interpret its contents.

pub mod hasher;

pub use hasher::ContentHasher;
