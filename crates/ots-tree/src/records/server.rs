use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Transport used to reach a server endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Tls,
}

/// One address a notary server listens on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Tcp,
        }
    }
}

/// A notary server the client talks to.
///
/// Version 1 carried a single `host`/`port` pair; version 2 replaced it with
/// a list of endpoints. The legacy fields are only ever read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub version: u32,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Hash of the server contract, when one has been imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_hash: Option<String>,
    #[serde(default, skip_serializing)]
    host: Option<String>,
    #[serde(default, skip_serializing)]
    port: Option<u16>,
}

impl ServerDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            id: id.into(),
            name: name.into(),
            endpoints: Vec::new(),
            contract_hash: None,
            host: None,
            port: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }
}

impl Record for ServerDescriptor {
    const KIND: &'static str = "server";
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
        if self.version < 2 {
            if let (Some(host), Some(port)) = (self.host.take(), self.port.take()) {
                self.endpoints.insert(0, Endpoint::tcp(host, port));
            }
            self.version = 2;
        }
        self.host = None;
        self.port = None;
    }

    fn validate(&self) -> Result<(), String> {
        for endpoint in &self.endpoints {
            if endpoint.host.is_empty() {
                return Err("endpoint with empty host".into());
            }
            if endpoint.port == 0 {
                return Err(format!("endpoint {} has port 0", endpoint.host));
            }
        }
        if let Some(hash) = &self.contract_hash {
            if !ots_types::check_hash(hash) {
                return Err(format!("malformed contract hash {hash:?}"));
            }
        }
        Ok(())
    }
}
