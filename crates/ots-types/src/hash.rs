use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Number of bytes in a content hash.
pub const HASH_LEN: usize = 32;

/// Number of hex characters in the canonical textual form of a hash.
pub const HASH_HEX_LEN: usize = HASH_LEN * 2;

/// Content-addressed key for a stored blob.
///
/// A `ContentHash` is the digest of a blob's bytes. Identical bytes always
/// produce the same hash, so two blobs with equal hashes are interchangeable.
///
/// The all-zero value is [`ContentHash::BLANK`]: it names a node that has
/// never been persisted and is never dereferenced. On the wire a hash is a
/// 64-character lowercase hex string; the blank hash is the empty string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// The blank hash (all zeros). Represents "nothing stored yet".
    pub const BLANK: Self = Self([0u8; HASH_LEN]);

    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; HASH_LEN]) -> Self {
        Self(hash)
    }

    /// Digest raw bytes with plain BLAKE3 (no domain tag).
    ///
    /// Storage keys are produced by `ots_crypto::ContentHasher`; this is a
    /// convenience for tests and fixtures.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Returns `true` if this is the blank hash.
    pub fn is_blank(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Two-character prefix used to shard blob files into subdirectories.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Parse the canonical hex form.
    ///
    /// The input must pass [`check_hash`]; upper-case hex, surrounding
    /// whitespace and the blank hash are all rejected.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != HASH_HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: HASH_HEX_LEN,
                actual: s.len(),
            });
        }
        if !check_hash(s) {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Parse a wire value where the empty string denotes [`ContentHash::BLANK`].
    pub fn from_wire(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            Ok(Self::BLANK)
        } else {
            Self::from_hex(s)
        }
    }

    /// Wire form: the empty string for the blank hash, hex otherwise.
    pub fn to_wire(&self) -> String {
        if self.is_blank() {
            String::new()
        } else {
            self.to_hex()
        }
    }
}

/// Syntactic validation of a textual hash before it is used as a lookup key.
///
/// Accepts exactly 64 lowercase hex characters that do not encode the blank
/// hash. An empty or malformed hash is never dereferenced.
pub fn check_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN
        && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && s.bytes().any(|b| b != b'0')
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::BLANK
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blank() {
            write!(f, "ContentHash(BLANK)")
        } else {
            write!(f, "ContentHash({})", self.short_hex())
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_LEN]> for ContentHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; HASH_LEN] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_wire(&s).map_err(serde::de::Error::custom)
    }
}
