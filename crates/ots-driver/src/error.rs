use ots_types::{ContentHash, TypeError};

/// Errors from driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The requested blob is in neither bucket.
    #[error("blob not found: {0}")]
    NotFound(ContentHash),

    /// The blank hash names nothing and is never dereferenced.
    #[error("cannot dereference the blank hash")]
    BlankHash,

    /// A textual hash failed syntactic validation.
    #[error("invalid hash: {0}")]
    InvalidHash(#[from] TypeError),

    /// Content hash mismatch on read (torn write or tampering).
    #[error("hash mismatch for {hash}: computed {computed}")]
    HashMismatch {
        hash: ContentHash,
        computed: ContentHash,
    },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blob referenced by the tree could not be decoded while walking it.
    #[error("corrupt blob {hash}: {reason}")]
    CorruptBlob { hash: ContentHash, reason: String },

    /// A shared lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A write failed because the driver was told to fail it.
    #[error("injected write failure: {0}")]
    Injected(&'static str),

    /// Migration stopped; the target root pointer was not touched.
    #[error("migration aborted: {0}")]
    Migration(#[source] Box<DriverError>),
}

impl DriverError {
    pub(crate) fn poisoned(e: impl std::fmt::Display) -> Self {
        Self::LockPoisoned(e.to_string())
    }
}

/// Result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
