use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A contract issuer known to this client, keyed by issuer ID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerProfile {
    pub version: u32,
    pub id: String,
    /// Pseudonym the local user holds with this issuer.
    pub nym_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub account_ids: BTreeSet<String>,
    /// Whether the nym is paired with the issuer. Added in version 2.
    #[serde(default)]
    pub paired: bool,
}

impl IssuerProfile {
    pub fn new(id: impl Into<String>, nym_id: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            id: id.into(),
            nym_id: nym_id.into(),
            display_name: String::new(),
            account_ids: BTreeSet::new(),
            paired: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

impl Record for IssuerProfile {
    const KIND: &'static str = "issuer";
    const CURRENT_VERSION: u32 = 2;

    fn blank(id: &str) -> Self {
        Self::new(id, "")
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn upgrade(&mut self) {
        // v1 -> v2: `paired` defaults to false via serde.
        if self.version < Self::CURRENT_VERSION {
            self.version = Self::CURRENT_VERSION;
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.nym_id.is_empty() {
            return Err("empty nym id".into());
        }
        if self.account_ids.iter().any(String::is_empty) {
            return Err("empty account id".into());
        }
        Ok(())
    }
}
