use ots_types::ContentHash;

/// Key-derivation context for blob keys. Changing it re-keys every store.
const BLOB_CONTEXT: &str = "ots 2024-06 blob key v1";

/// BLAKE3 in key-derivation mode, keyed by a fixed context string.
///
/// Keys never collide with plain BLAKE3 digests of the same bytes, and the
/// key of a byte string is the same in every process and on every backend.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    context: &'static str,
}

impl ContentHasher {
    /// Hasher for every stored blob (index nodes, leaf records, root records).
    pub const BLOB: Self = Self {
        context: BLOB_CONTEXT,
    };

    /// The key of `data`.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut hasher = blake3::Hasher::new_derive_key(self.context);
        hasher.update(data);
        ContentHash::from_hash(*hasher.finalize().as_bytes())
    }

    /// True if `data` is stored under `expected`.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }
}
