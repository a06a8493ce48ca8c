//! Error types for the tree crate.

use ots_driver::DriverError;
use ots_types::ContentHash;

/// Error classification for retry/escalation decisions.
///
/// - `NotFound`: a lookup named something absent
/// - `Corrupt`: one record's bytes are missing or undecodable
/// - `CorruptIndex`: an index node cannot be enumerated; the only kind a
///   caller should not try to continue past
/// - `Validation`: a record or index failed its schema check; nothing was written
/// - `Io`: the driver failed a read or write; retry may succeed
/// - `Migration`: a migration aborted with the target root untouched
/// - `Conflict`: the operation would overwrite an existing entry
/// - `Internal`: poisoned locks, failed background tasks, bad configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Corrupt,
    CorruptIndex,
    Validation,
    Io,
    Migration,
    Conflict,
    Internal,
}

/// Errors from tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The driver failed.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// An index node (or the aggregate root) names bytes that cannot be
    /// resolved or decoded.
    #[error("corrupt {node} index {hash}: {reason}")]
    CorruptIndex {
        node: &'static str,
        hash: ContentHash,
        reason: String,
    },

    /// An entry the caller asserted exists is not in the index.
    #[error("{kind} {id:?} missing from index")]
    MissingEntry { kind: &'static str, id: String },

    /// An index entry refers to a blob the driver does not hold.
    #[error("{kind} {id:?} refers to missing blob {hash}")]
    MissingBlob {
        kind: &'static str,
        id: String,
        hash: ContentHash,
    },

    /// A leaf record's bytes did not deserialize.
    #[error("cannot decode {kind} {hash}: {reason}")]
    Decode {
        kind: &'static str,
        hash: ContentHash,
        reason: String,
    },

    /// A stored value claims a schema version newer than this build knows.
    #[error("{kind} version {found} is newer than supported version {max}")]
    UnsupportedVersion {
        kind: &'static str,
        found: u32,
        max: u32,
    },

    /// A record or index failed schema validation before being written.
    #[error("invalid {kind}: {reason}")]
    Validation { kind: &'static str, reason: String },

    /// The target ID is already taken.
    #[error("{kind} {id:?} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    /// Serialization of an in-memory value failed.
    #[error("cannot encode {kind}: {reason}")]
    Encode { kind: &'static str, reason: String },

    /// A shared lock was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A task on the blocking pool panicked or was cancelled.
    #[error("background task failed: {0}")]
    Background(String),
}

impl TreeError {
    pub(crate) fn poisoned(e: impl std::fmt::Display) -> Self {
        Self::LockPoisoned(e.to_string())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreeError::Driver(e) => match e {
                DriverError::NotFound(_) => ErrorKind::NotFound,
                DriverError::HashMismatch { .. } | DriverError::CorruptBlob { .. } => {
                    ErrorKind::Corrupt
                }
                DriverError::Io(_) | DriverError::Injected(_) => ErrorKind::Io,
                DriverError::Migration(_) => ErrorKind::Migration,
                DriverError::BlankHash | DriverError::InvalidHash(_) => ErrorKind::Validation,
                DriverError::Config(_) | DriverError::LockPoisoned(_) => ErrorKind::Internal,
            },
            TreeError::CorruptIndex { .. } | TreeError::MissingEntry { .. } => {
                ErrorKind::CorruptIndex
            }
            TreeError::MissingBlob { .. }
            | TreeError::Decode { .. }
            | TreeError::UnsupportedVersion { .. } => ErrorKind::Corrupt,
            TreeError::Validation { .. } => ErrorKind::Validation,
            TreeError::AlreadyExists { .. } => ErrorKind::Conflict,
            TreeError::Encode { .. }
            | TreeError::LockPoisoned(_)
            | TreeError::Background(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the caller may retry or keep using the tree.
    ///
    /// Only an unreadable index is unrecoverable: continuing would operate
    /// on an incomplete view of the children.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::CorruptIndex)
    }

    /// Returns true for driver I/O failures, which leave the tree at its
    /// last published state.
    pub fn is_io(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io)
    }
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_index_is_the_only_unrecoverable_kind() {
        let corrupt = TreeError::CorruptIndex {
            node: "issuers",
            hash: ContentHash::digest(b"x"),
            reason: "missing".into(),
        };
        assert_eq!(corrupt.kind(), ErrorKind::CorruptIndex);
        assert!(!corrupt.is_recoverable());

        let io = TreeError::Driver(DriverError::Injected("blob write"));
        assert!(io.is_io());
        assert!(io.is_recoverable());

        let conflict = TreeError::AlreadyExists {
            kind: "issuer",
            id: "X2".into(),
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn driver_errors_are_classified() {
        let missing = TreeError::from(DriverError::NotFound(ContentHash::digest(b"y")));
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let migration = TreeError::from(DriverError::Migration(Box::new(DriverError::BlankHash)));
        assert_eq!(migration.kind(), ErrorKind::Migration);
        assert!(migration.is_recoverable());
    }

    #[test]
    fn display_names_the_record_kind() {
        let err = TreeError::Validation {
            kind: "thread",
            reason: "no participants".into(),
        };
        assert_eq!(err.to_string(), "invalid thread: no participants");
    }
}
