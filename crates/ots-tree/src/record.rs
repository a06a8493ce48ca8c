//! The leaf-record contract shared by every index node type.

use serde::de::DeserializeOwned;
use serde::Serialize;

use ots_types::ContentHash;

use crate::error::{TreeError, TreeResult};

/// A versioned record stored as a leaf under an [`IndexNode`](crate::IndexNode).
///
/// Each record type owns its schema: a `version` field on the wire, an
/// upgrade rule for older versions, and a validation check that runs before
/// any bytes reach the driver.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Short name used in errors and logs (`"issuer"`, `"thread"`, ...).
    const KIND: &'static str;

    /// Schema version written by this build.
    const CURRENT_VERSION: u32;

    /// Schema version of the index node holding records of this type.
    const INDEX_VERSION: u32 = 2;

    /// An empty record for `id`, handed out by a checkout of an absent ID.
    fn blank(id: &str) -> Self;

    /// The record's own logical ID.
    fn id(&self) -> &str;

    /// The schema version this value was decoded from (or created at).
    fn version(&self) -> u32;

    /// Raise the value to [`Record::CURRENT_VERSION`], default-filling new
    /// fields. Must be a no-op on a current value.
    fn upgrade(&mut self);

    /// Schema check run before the record is stored.
    fn validate(&self) -> Result<(), String>;
}

/// Serialize `record` into its stored form.
pub fn encode<R: Record>(record: &R) -> TreeResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| TreeError::Encode {
        kind: R::KIND,
        reason: e.to_string(),
    })
}

/// Deserialize bytes stored under `hash`, upgrading older schema versions.
///
/// A version above [`Record::CURRENT_VERSION`] is rejected: there is no
/// downgrade path.
pub fn decode<R: Record>(hash: &ContentHash, bytes: &[u8]) -> TreeResult<R> {
    let mut record: R = serde_json::from_slice(bytes).map_err(|e| TreeError::Decode {
        kind: R::KIND,
        hash: *hash,
        reason: e.to_string(),
    })?;
    if record.version() > R::CURRENT_VERSION {
        return Err(TreeError::UnsupportedVersion {
            kind: R::KIND,
            found: record.version(),
            max: R::CURRENT_VERSION,
        });
    }
    record.upgrade();
    Ok(record)
}

/// Run [`Record::validate`] and check the version is current.
pub(crate) fn check<R: Record>(record: &R) -> TreeResult<()> {
    let invalid = |reason: String| TreeError::Validation {
        kind: R::KIND,
        reason,
    };
    if record.id().is_empty() {
        return Err(invalid("empty id".into()));
    }
    if record.version() != R::CURRENT_VERSION {
        return Err(invalid(format!(
            "version {} is not current ({})",
            record.version(),
            R::CURRENT_VERSION
        )));
    }
    record.validate().map_err(invalid)
}
