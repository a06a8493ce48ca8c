//! Shared node types and the serialized forms of index and root nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use ots_types::ContentHash;

/// Which index node under the aggregate root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Servers,
    Issuers,
    Threads,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Servers, Role::Issuers, Role::Threads];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Servers => "servers",
            Role::Issuers => "issuers",
            Role::Threads => "threads",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role {s:?} (expected servers, issuers or threads)"))
    }
}

/// Per-child bookkeeping held by an index node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub hash: ContentHash,
    pub alias: String,
    /// Advisory byte size of the stored record; 0 until known.
    pub size: u64,
    /// The child is materialized in the node's cache.
    pub loaded: bool,
}

impl Metadata {
    pub(crate) fn new(hash: ContentHash, alias: impl Into<String>, size: u64) -> Self {
        Self {
            hash,
            alias: alias.into(),
            size,
            loaded: false,
        }
    }
}

/// One `(id, hash, alias)` triple of an index node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub item_id: String,
    pub hash: String,
    /// Absent in version 1 indexes.
    #[serde(default)]
    pub alias: String,
}

/// Serialized form of an index node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

impl IndexRecord {
    pub(crate) fn from_entries(version: u32, entries: &BTreeMap<String, Metadata>) -> Self {
        Self {
            version,
            entries: entries
                .iter()
                .map(|(id, meta)| IndexEntry {
                    item_id: id.clone(),
                    hash: meta.hash.to_wire(),
                    alias: meta.alias.clone(),
                })
                .collect(),
        }
    }

    /// Check every entry and build the in-memory map.
    pub fn to_entries(&self) -> Result<BTreeMap<String, Metadata>, String> {
        let mut entries = BTreeMap::new();
        for entry in &self.entries {
            if entry.item_id.is_empty() {
                return Err("entry with empty item id".into());
            }
            let hash = ContentHash::from_hex(&entry.hash)
                .map_err(|e| format!("entry {:?}: {e}", entry.item_id))?;
            let meta = Metadata::new(hash, entry.alias.clone(), 0);
            if entries.insert(entry.item_id.clone(), meta).is_some() {
                return Err(format!("duplicate item id {:?}", entry.item_id));
            }
        }
        Ok(entries)
    }

    /// Hashes of every child, for traversal.
    pub fn child_hashes(&self) -> Result<Vec<ContentHash>, String> {
        Ok(self.to_entries()?.into_values().map(|m| m.hash).collect())
    }
}

/// Version of the aggregate root record.
pub const ROOT_VERSION: u32 = 1;

/// One index node reference held by the aggregate root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootEntry {
    pub role: Role,
    pub hash: String,
}

/// Serialized form of the aggregate root. Roles whose index was never
/// saved are omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub version: u32,
    #[serde(default)]
    pub nodes: Vec<RootEntry>,
}

impl RootRecord {
    pub(crate) fn from_hashes(hashes: &BTreeMap<Role, ContentHash>) -> Self {
        Self {
            version: ROOT_VERSION,
            nodes: hashes
                .iter()
                .filter(|(_, hash)| !hash.is_blank())
                .map(|(role, hash)| RootEntry {
                    role: *role,
                    hash: hash.to_hex(),
                })
                .collect(),
        }
    }

    /// Check the record and return the index hash per role.
    pub fn to_hashes(&self) -> Result<BTreeMap<Role, ContentHash>, String> {
        if self.version > ROOT_VERSION {
            return Err(format!(
                "root version {} is newer than {ROOT_VERSION}",
                self.version
            ));
        }
        let mut seen = BTreeSet::new();
        let mut hashes = BTreeMap::new();
        for node in &self.nodes {
            if !seen.insert(node.role) {
                return Err(format!("role {} listed twice", node.role));
            }
            let hash = ContentHash::from_hex(&node.hash)
                .map_err(|e| format!("role {}: {e}", node.role))?;
            hashes.insert(node.role, hash);
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(data: &[u8]) -> ContentHash {
        ContentHash::digest(data)
    }

    #[test]
    fn role_parse_and_display() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("contracts".parse::<Role>().is_err());
    }

    #[test]
    fn index_record_roundtrip_through_entries() {
        let mut entries = BTreeMap::new();
        entries.insert("b".to_string(), Metadata::new(h(b"b"), "", 3));
        entries.insert("a".to_string(), Metadata::new(h(b"a"), "Alias", 5));

        let record = IndexRecord::from_entries(2, &entries);
        assert_eq!(record.entries[0].item_id, "a");
        assert_eq!(record.entries[0].alias, "Alias");

        let back = record.to_entries().unwrap();
        assert_eq!(back["a"].hash, h(b"a"));
        // Size is advisory and not part of the wire form.
        assert_eq!(back["a"].size, 0);
    }

    #[test]
    fn v1_index_has_no_alias() {
        let json = format!(
            r#"{{"version":1,"entries":[{{"item_id":"x","hash":"{}"}}]}}"#,
            h(b"x").to_hex()
        );
        let record: IndexRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.to_entries().unwrap()["x"].alias, "");
    }

    #[test]
    fn index_record_rejects_bad_entries() {
        let bad_hash = IndexRecord {
            version: 2,
            entries: vec![IndexEntry {
                item_id: "x".into(),
                hash: String::new(),
                alias: String::new(),
            }],
        };
        assert!(bad_hash.to_entries().is_err());

        let dup = IndexRecord {
            version: 2,
            entries: vec![
                IndexEntry {
                    item_id: "x".into(),
                    hash: h(b"1").to_hex(),
                    alias: String::new(),
                },
                IndexEntry {
                    item_id: "x".into(),
                    hash: h(b"2").to_hex(),
                    alias: String::new(),
                },
            ],
        };
        assert!(dup.to_entries().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn root_record_omits_blank_roles() {
        let mut hashes = BTreeMap::new();
        hashes.insert(Role::Servers, ContentHash::BLANK);
        hashes.insert(Role::Threads, h(b"t"));
        let record = RootRecord::from_hashes(&hashes);
        assert_eq!(record.nodes.len(), 1);
        assert_eq!(record.nodes[0].role, Role::Threads);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""role":"threads""#));
        let back: RootRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_hashes().unwrap()[&Role::Threads], h(b"t"));
    }

    #[test]
    fn root_record_rejects_future_version() {
        let record = RootRecord {
            version: ROOT_VERSION + 1,
            nodes: Vec::new(),
        };
        assert!(record.to_hashes().is_err());
    }
}
