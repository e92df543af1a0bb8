//! Peer registry
//!
//! The set of hosts participating in the mesh, with the fleet-wide
//! one-address-per-host check. Validation must pass before any host is
//! provisioned: two hosts silently sharing a mesh identity is unrecoverable
//! after the fact.

use crate::inventory::{HostRecord, Inventory};
use crate::{Error, Result};
use std::collections::HashMap;

/// Mesh participants, sorted by host name for deterministic iteration
#[derive(Debug, Clone)]
pub struct Registry {
    hosts: Vec<HostRecord>,
}

impl Registry {
    /// Build the registry from the inventory, keeping only hosts with a
    /// declared mesh address.
    pub fn from_inventory(inventory: &Inventory) -> Self {
        let mut hosts: Vec<HostRecord> = inventory
            .hosts
            .iter()
            .filter(|h| h.in_mesh())
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name));
        Self { hosts }
    }

    /// All mesh participants, sorted by name
    pub fn hosts(&self) -> &[HostRecord] {
        &self.hosts
    }

    /// Look up a participant by name
    pub fn get(&self, name: &str) -> Option<&HostRecord> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Every participant other than `current`
    pub fn peers_of<'a>(&'a self, current: &'a str) -> impl Iterator<Item = &'a HostRecord> {
        self.hosts.iter().filter(move |h| h.name != current)
    }

    /// Enforce the one-address-per-host invariant. Fails on the first
    /// collision of bare (prefix-stripped) addresses, naming both hosts.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for host in &self.hosts {
            // Participants always have an address
            let Some(addr) = host.bare_addr() else {
                continue;
            };
            if let Some(first) = seen.insert(addr, &host.name) {
                return Err(Error::DuplicateAddress {
                    addr: addr.to_string(),
                    first: first.to_string(),
                    second: host.name.clone(),
                });
            }
        }
        Ok(())
    }
}
