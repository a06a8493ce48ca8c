use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One of the two disjoint blob namespaces.
///
/// Exactly one bucket is active for new writes at any time. Compaction
/// flips the active bucket, copies everything reachable into it, and then
/// drops the other namespace wholesale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    #[default]
    A,
    B,
}

impl Bucket {
    /// Both buckets, in namespace order.
    pub const ALL: [Bucket; 2] = [Bucket::A, Bucket::B];

    /// The other bucket.
    pub fn flip(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Directory / namespace name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Parse a namespace name (`"A"` or `"B"`, surrounding whitespace ignored).
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        match s.trim() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            other => Err(TypeError::InvalidBucket(other.to_string())),
        }
    }
}

/// `false` selects bucket A, `true` selects bucket B.
impl From<bool> for Bucket {
    fn from(flag: bool) -> Self {
        if flag {
            Self::B
        } else {
            Self::A
        }
    }
}

impl From<Bucket> for bool {
    fn from(bucket: Bucket) -> Self {
        bucket == Bucket::B
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
