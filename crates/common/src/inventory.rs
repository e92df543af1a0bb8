//! Fleet inventory
//!
//! Per-host metadata loaded once at run start from a TOML file and immutable
//! thereafter. Recognized per-host keys:
//!
//! - `wireguard_addr`: mesh CIDR, absent means the host is not in the mesh
//! - `wireguard_listenport`: UDP listen port (default 51820)
//! - `external`: host is reachable from outside the fleet (default false)
//! - `persistent_keepalive`: keepalive seconds, 0 disables (default 25)
//! - `linux_name`: distribution identity fact (e.g. "Ubuntu"), gates
//!   distro-specific operations

use crate::{Error, Result};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default WireGuard listen port
pub const DEFAULT_LISTEN_PORT: u16 = 51820;

/// Default persistent-keepalive interval in seconds
pub const DEFAULT_KEEPALIVE: u16 = 25;

/// Raw per-host inventory entry as written in the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct HostData {
    wireguard_addr: Option<String>,
    wireguard_listenport: Option<u16>,
    external: bool,
    persistent_keepalive: Option<u16>,
    linux_name: Option<String>,
}

/// One host of the fleet, with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub name: String,
    /// Mesh CIDR; `None` means the host does not participate in the mesh
    pub mesh_addr: Option<String>,
    pub listen_port: u16,
    pub external: bool,
    /// Keepalive seconds; 0 means disabled
    pub persistent_keepalive: u16,
    /// Linux distribution fact, if known
    pub linux_name: Option<String>,
}

impl HostRecord {
    fn from_data(name: String, data: HostData) -> Self {
        Self {
            name,
            mesh_addr: data.wireguard_addr,
            listen_port: data.wireguard_listenport.unwrap_or(DEFAULT_LISTEN_PORT),
            external: data.external,
            persistent_keepalive: data.persistent_keepalive.unwrap_or(DEFAULT_KEEPALIVE),
            linux_name: data.linux_name,
        }
    }

    /// Whether the host participates in the mesh
    pub fn in_mesh(&self) -> bool {
        self.mesh_addr.is_some()
    }

    /// Mesh address with the prefix length stripped
    pub fn bare_addr(&self) -> Option<&str> {
        self.mesh_addr
            .as_deref()
            .map(|a| a.split('/').next().unwrap_or(a))
    }

    /// Whether the distro fact says this is an Ubuntu host
    pub fn is_ubuntu(&self) -> bool {
        self.linux_name.as_deref() == Some("Ubuntu")
    }
}

/// Mesh-wide settings shared by every host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MeshSettings {
    /// Candidate physical interface names, most specific first. The first
    /// interface with an assigned address becomes the host's detected
    /// external address.
    pub interfaces: Vec<String>,

    /// WireGuard interface name
    pub interface: String,

    /// Directory holding the keypair on each host
    pub key_dir: PathBuf,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            interfaces: ["enp1s0", "ens18", "eno0", "eth0", "eth1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interface: "wg0".to_string(),
            key_dir: PathBuf::from(".wg"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventoryFile {
    #[serde(default)]
    mesh: MeshSettings,
    #[serde(default)]
    hosts: BTreeMap<String, HostData>,
}

/// The loaded fleet inventory
#[derive(Debug, Clone)]
pub struct Inventory {
    pub mesh: MeshSettings,
    pub hosts: Vec<HostRecord>,
}

impl Inventory {
    /// Load and validate the inventory from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse inventory from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let file: InventoryFile = toml::from_str(content)?;
        let hosts: Vec<HostRecord> = file
            .hosts
            .into_iter()
            .map(|(name, data)| HostRecord::from_data(name, data))
            .collect();

        for host in &hosts {
            if let Some(addr) = &host.mesh_addr {
                addr.parse::<IpNetwork>().map_err(|e| {
                    Error::Validation(format!(
                        "host {}: bad wireguard_addr {:?}: {}",
                        host.name, addr, e
                    ))
                })?;
            }
        }

        Ok(Self {
            mesh: file.mesh,
            hosts,
        })
    }

    /// Look up a host by name
    pub fn host(&self, name: &str) -> Option<&HostRecord> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Look up a host by name, failing if it is not in the inventory
    pub fn require(&self, name: &str) -> Result<&HostRecord> {
        self.host(name).ok_or_else(|| Error::NotFound {
            kind: "host".to_string(),
            id: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
[hosts.host1]
wireguard_addr = "10.10.0.1/24"
external = true
linux_name = "Ubuntu"

[hosts.host2]
wireguard_addr = "10.10.0.2/24"
wireguard_listenport = 51821
persistent_keepalive = 0

[hosts.bastion]
"#;

    #[test]
    fn parse_applies_defaults() {
        let inv = Inventory::parse(INVENTORY).unwrap();
        let h1 = inv.host("host1").unwrap();
        assert_eq!(h1.listen_port, 51820);
        assert_eq!(h1.persistent_keepalive, 25);
        assert!(h1.external);
        assert!(h1.is_ubuntu());

        let h2 = inv.host("host2").unwrap();
        assert_eq!(h2.listen_port, 51821);
        assert_eq!(h2.persistent_keepalive, 0);
        assert!(!h2.external);

        let bastion = inv.host("bastion").unwrap();
        assert!(!bastion.in_mesh());
    }

    #[test]
    fn bare_addr_strips_prefix() {
        let inv = Inventory::parse(INVENTORY).unwrap();
        assert_eq!(inv.host("host1").unwrap().bare_addr(), Some("10.10.0.1"));
        assert_eq!(inv.host("bastion").unwrap().bare_addr(), None);
    }

    #[test]
    fn rejects_malformed_cidr() {
        let bad = r#"
[hosts.h]
wireguard_addr = "not-an-address"
"#;
        assert!(matches!(
            Inventory::parse(bad),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let bad = r#"
[hosts.h]
wireguard_address = "10.0.0.1/24"
"#;
        assert!(Inventory::parse(bad).is_err());
    }

    #[test]
    fn require_reports_missing_host() {
        let inv = Inventory::parse(INVENTORY).unwrap();
        assert!(inv.require("host1").is_ok());
        assert!(matches!(
            inv.require("ghost"),
            Err(crate::Error::NotFound { .. })
        ));
    }

    #[test]
    fn default_interface_priority() {
        let inv = Inventory::parse("").unwrap();
        assert_eq!(inv.mesh.interfaces[0], "enp1s0");
        assert_eq!(inv.mesh.interface, "wg0");
    }
}
