//! The in-memory schema tree this core consumes. Schema *source text*
//! parsing (YAML/JSON/etc.) is an external collaborator's job (spec §1);
//! this module only defines the tree shape and a tiny builder API.

pub mod field;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use field::*;

use crate::cursor::ByteOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Uplink,
    Downlink,
    Bidirectional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortEntry {
    pub fields: Vec<Field>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortKey {
    Port(u32),
    Default,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortTable {
    pub entries: IndexMap<PortKey, PortEntry>,
}

impl PortTable {
    /// Resolve a port number against the table, falling back to the
    /// `"default"` entry if one is declared (spec §6).
    pub fn resolve(&self, port: u32) -> Option<&PortEntry> {
        self.entries
            .get(&PortKey::Port(port))
            .or_else(|| self.entries.get(&PortKey::Default))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default = "default_byte_order")]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub header: Vec<Field>,
    pub fields: Vec<Field>,
    pub ports: Option<PortTable>,
}

fn default_byte_order() -> ByteOrder {
    ByteOrder::Big
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Schema {
            name: None,
            version: None,
            byte_order: ByteOrder::Big,
            header: Vec::new(),
            fields,
            ports: None,
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_header(mut self, header: Vec<Field>) -> Self {
        self.header = header;
        self
    }

    pub fn with_ports(mut self, ports: PortTable) -> Self {
        self.ports = Some(ports);
        self
    }

    /// The field sequence to traverse for a given port, per spec §3: "When
    /// a port table is present and a port is supplied, its sequence
    /// replaces the main sequence; the header still applies."
    pub(crate) fn sequence_for_port(&self, port: Option<u32>) -> crate::error::Result<&[Field]> {
        match (port, &self.ports) {
            (Some(p), Some(table)) => table
                .resolve(p)
                .map(|entry| entry.fields.as_slice())
                .ok_or(crate::error::CodecError::PortNotFound(p)),
            _ => Ok(self.fields.as_slice()),
        }
    }
}
