//! Point-in-time record of a watched resource.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remotely managed resource (an instance id).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wrap a raw resource id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One host-side binding of a container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Host address the port is bound on (often `0.0.0.0`).
    pub host_ip: String,
    /// Externally reachable port.
    pub host_port: u16,
}

impl HostBinding {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(host_ip: impl Into<String>, host_port: u16) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port,
        }
    }
}

/// Normalized port table: container port spec (e.g. `"22/tcp"`) to host bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMapping(BTreeMap<String, Vec<HostBinding>>);

impl PortMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, container_port: impl Into<String>, bindings: Vec<HostBinding>) -> Self {
        self.insert(container_port, bindings);
        self
    }

    /// Insert or replace the bindings for a container port.
    pub fn insert(&mut self, container_port: impl Into<String>, bindings: Vec<HostBinding>) {
        self.0.insert(container_port.into(), bindings);
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Bindings for a container port spec.
    #[must_use]
    pub fn get(&self, container_port: &str) -> Option<&[HostBinding]> {
        self.0.get(container_port).map(Vec::as_slice)
    }

    /// Iterate `(container port spec, bindings)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[HostBinding])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// First external port bound to the given internal port, regardless of protocol.
    #[must_use]
    pub fn external_port(&self, internal: u16) -> Option<u16> {
        self.0
            .iter()
            .filter(|(key, _)| parse_internal_port(key) == Some(internal))
            .find_map(|(_, bindings)| bindings.first().map(|b| b.host_port))
    }

    /// Internal port to first external port, for every entry with at least one binding.
    #[must_use]
    pub fn external_ports(&self) -> BTreeMap<u16, u16> {
        self.0
            .iter()
            .filter_map(|(key, bindings)| {
                let internal = parse_internal_port(key)?;
                let first = bindings.first()?;
                Some((internal, first.host_port))
            })
            .collect()
    }
}

/// `"22/tcp"` -> 22, `"8080"` -> 8080.
fn parse_internal_port(key: &str) -> Option<u16> {
    let number = key.split_once('/').map_or(key, |(n, _)| n);
    number.trim().parse().ok()
}

/// Everything externally observable about a resource at one instant.
///
/// Snapshots are always whole; the monitor replaces the last known one
/// atomically after every tick.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub resource_id: ResourceId,
    /// Primary lifecycle state (`cur_state`).
    pub state: String,
    /// Secondary status (`actual_status`).
    pub status: String,
    /// Connectivity host; empty when unknown.
    pub host: String,
    /// Connectivity port; zero when unknown.
    pub port: u16,
    /// `None` unless the provider reported a structured, non-list port table.
    pub port_mapping: Option<PortMapping>,
    pub public_address: Option<String>,
}

impl Snapshot {
    /// Empty snapshot for a resource: no state, no connectivity, no mapping.
    #[must_use]
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            state: String::new(),
            status: String::new(),
            host: String::new(),
            port: 0,
            port_mapping: None,
            public_address: None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>, status: impl Into<String>) -> Self {
        self.state = state.into();
        self.status = status.into();
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_connectivity(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_port_mapping(mut self, mapping: PortMapping) -> Self {
        self.port_mapping = Some(mapping);
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_public_address(mut self, address: impl Into<String>) -> Self {
        self.public_address = Some(address.into());
        self
    }

    /// Host is non-empty and port is positive.
    #[must_use]
    pub fn is_connectivity_ready(&self) -> bool {
        !self.host.trim().is_empty() && self.port > 0
    }

    /// A structured port table is present and non-empty.
    #[must_use]
    pub fn is_port_mapped(&self) -> bool {
        self.port_mapping.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Public address if non-blank, otherwise the connectivity host.
    #[must_use]
    pub fn public_address_or_host(&self) -> &str {
        match self.public_address.as_deref() {
            Some(addr) if !addr.trim().is_empty() => addr,
            _ => &self.host,
        }
    }
}
