//! Port-mapping inspection.
//!
//! The runtime reports published ports per protocol:
//!
//! ```json
//! { "8080/tcp": [{ "HostIp": "0.0.0.0", "HostPort": "49153" }], "9000/udp": null }
//! ```
//!
//! [`PortMap`] flattens that table into container port -> host port.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One host-side binding of a published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Host interface address.
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    /// Host port, as a decimal string.
    #[serde(rename = "HostPort", default)]
    pub host_port: String,
}

impl HostBinding {
    /// A binding on all interfaces.
    #[must_use]
    pub fn any_interface(host_port: u16) -> Self {
        Self {
            host_ip: "0.0.0.0".into(),
            host_port: host_port.to_string(),
        }
    }
}

/// Raw per-protocol binding table as reported by the runtime.
pub type RawPortBindings = BTreeMap<String, Option<Vec<HostBinding>>>;

/// Container port -> host port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMap(BTreeMap<u16, u16>);

impl PortMap {
    /// Flattens a raw binding table.
    ///
    /// Unbound and unparsable entries are skipped. When one container
    /// port is published several times (per protocol or per interface)
    /// the first binding wins.
    #[must_use]
    pub fn from_bindings(raw: &RawPortBindings) -> Self {
        let mut map = BTreeMap::new();
        for (key, bindings) in raw {
            let port = key.split_once('/').map_or(key.as_str(), |(p, _)| p);
            let Ok(container_port) = port.parse::<u16>() else {
                tracing::debug!(key = %key, "skipping unparsable port key");
                continue;
            };
            let host_port = bindings
                .iter()
                .flatten()
                .find_map(|b| b.host_port.parse::<u16>().ok());
            if let Some(host_port) = host_port {
                let _ = map.entry(container_port).or_insert(host_port);
            }
        }
        Self(map)
    }

    /// Host port bound to `container_port`.
    #[must_use]
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.0.get(&container_port).copied()
    }

    /// Iterates `(container, host)` pairs in container-port order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.0.iter().map(|(c, h)| (*c, *h))
    }

    /// Number of mapped ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
