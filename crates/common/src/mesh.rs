//! Peer mesh resolution
//!
//! Pure resolution over already-published state: joins every other mesh
//! participant with its artifacts and emits the `wg set` peer command set for
//! the current host. Performs no network calls; re-running with unchanged
//! inputs yields the identical command sequence.

use crate::inventory::HostRecord;
use crate::registry::Registry;
use crate::runner::{run_checked, CommandRunner};
use crate::store::{address_slot, ArtifactStore, SLOT_PUBKEY};
use crate::Result;
use serde::Serialize;
use tracing::info;

/// Published state of one host, read back from the artifact store
#[derive(Debug, Clone, Default)]
pub struct PeerArtifact {
    pub public_key: Option<String>,
    /// (interface, detected address), in candidate-interface priority order
    pub addresses: Vec<(String, String)>,
}

impl PeerArtifact {
    /// First detected address in priority order
    pub fn effective_addr(&self) -> Option<&str> {
        self.addresses.first().map(|(_, addr)| addr.as_str())
    }
}

/// Read a host's artifacts for the given candidate interfaces
pub async fn load_artifact(
    store: &dyn ArtifactStore,
    host: &str,
    interfaces: &[String],
) -> Result<PeerArtifact> {
    let public_key = store.get(host, SLOT_PUBKEY).await?;
    let mut addresses = Vec::new();
    for iface in interfaces {
        if let Some(addr) = store.get(host, &address_slot(iface)).await? {
            addresses.push((iface.clone(), addr));
        }
    }
    Ok(PeerArtifact {
        public_key,
        addresses,
    })
}

/// One `wg set ... peer` binding for the current host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerCommand {
    pub host: String,
    pub public_key: String,
    /// The peer's mesh CIDR
    pub allowed_ips: String,
    /// Explicit dial target, present when the peer published an address
    pub endpoint: Option<(String, u16)>,
    pub persistent_keepalive: Option<u16>,
}

impl PeerCommand {
    /// The argv to execute on the current host
    pub fn to_args(&self, interface: &str) -> Vec<String> {
        let mut args = vec![
            "wg".to_string(),
            "set".to_string(),
            interface.to_string(),
            "peer".to_string(),
            self.public_key.clone(),
            "allowed-ips".to_string(),
            self.allowed_ips.clone(),
        ];
        if let Some((addr, port)) = &self.endpoint {
            args.push("endpoint".to_string());
            args.push(format!("{addr}:{port}"));
        }
        if let Some(keepalive) = self.persistent_keepalive {
            args.push("persistent-keepalive".to_string());
            args.push(keepalive.to_string());
        }
        args
    }
}

/// Why a peer produced no command this run. Incomplete state, not an error:
/// the operator re-runs phase 2 once the peer has published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nothing published yet
    NoArtifact,
    /// Addresses published but no trust material
    NoPublicKey,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoArtifact => write!(f, "no published artifact"),
            SkipReason::NoPublicKey => write!(f, "no published public key"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPeer {
    pub host: String,
    pub reason: SkipReason,
}

/// Resolve the peer command set for `current`.
///
/// Endpoint policy: a peer with a detected address gets an explicit
/// endpoint. A peer that published no address cannot be dialed; it
/// initiates the handshake itself and WireGuard's roaming handles the rest.
pub async fn resolve_peers(
    current: &HostRecord,
    registry: &Registry,
    store: &dyn ArtifactStore,
    interfaces: &[String],
) -> Result<(Vec<PeerCommand>, Vec<SkippedPeer>)> {
    let mut commands = Vec::new();
    let mut skipped = Vec::new();

    for peer in registry.peers_of(&current.name) {
        // Registry members always carry a mesh address
        let Some(allowed_ips) = peer.mesh_addr.clone() else {
            continue;
        };

        let artifact = load_artifact(store, &peer.name, interfaces).await?;
        let Some(public_key) = artifact.public_key.clone() else {
            let reason = if artifact.addresses.is_empty() {
                SkipReason::NoArtifact
            } else {
                SkipReason::NoPublicKey
            };
            info!("skipping peer {}: {}", peer.name, reason);
            skipped.push(SkippedPeer {
                host: peer.name.clone(),
                reason,
            });
            continue;
        };

        let endpoint = artifact
            .effective_addr()
            .map(|addr| (addr.to_string(), peer.listen_port));

        let persistent_keepalive = if peer.persistent_keepalive > 0 {
            Some(peer.persistent_keepalive)
        } else {
            None
        };

        commands.push(PeerCommand {
            host: peer.name.clone(),
            public_key,
            allowed_ips,
            endpoint,
            persistent_keepalive,
        });
    }

    Ok((commands, skipped))
}

/// Execute the resolved peer commands on the current host
pub async fn apply_peers(
    runner: &dyn CommandRunner,
    interface: &str,
    commands: &[PeerCommand],
) -> Result<()> {
    for command in commands {
        run_checked(runner, &command.to_args(interface)).await?;
        info!("configured peer {}", command.host);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use crate::store::MemStore;

    const INTERFACES: &[&str] = &["enp1s0", "eth0"];

    fn interfaces() -> Vec<String> {
        INTERFACES.iter().map(|s| s.to_string()).collect()
    }

    fn fleet(toml: &str) -> (Inventory, Registry) {
        let inv = Inventory::parse(toml).unwrap();
        let reg = Registry::from_inventory(&inv);
        (inv, reg)
    }

    const TWO_HOSTS: &str = r#"
[hosts.host1]
wireguard_addr = "10.10.0.1/24"
external = true

[hosts.host2]
wireguard_addr = "10.10.0.2/24"
"#;

    #[tokio::test]
    async fn unpublished_peer_is_skipped_not_failed() {
        let (inv, reg) = fleet(TWO_HOSTS);
        let store = MemStore::new();

        let current = inv.host("host1").unwrap();
        let (commands, skipped) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert!(commands.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].host, "host2");
        assert_eq!(skipped[0].reason, SkipReason::NoArtifact);
    }

    #[tokio::test]
    async fn address_without_pubkey_is_skipped() {
        let (inv, reg) = fleet(TWO_HOSTS);
        let store = MemStore::new();
        store
            .put("host2", &address_slot("eth0"), "198.51.100.7")
            .await
            .unwrap();

        let current = inv.host("host1").unwrap();
        let (commands, skipped) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert!(commands.is_empty());
        assert_eq!(skipped[0].reason, SkipReason::NoPublicKey);
    }

    #[tokio::test]
    async fn external_peer_gets_endpoint_from_internal_host() {
        let (inv, reg) = fleet(TWO_HOSTS);
        let store = MemStore::new();
        store.put("host1", SLOT_PUBKEY, "PK1").await.unwrap();
        store
            .put("host1", &address_slot("eth0"), "1.2.3.4")
            .await
            .unwrap();

        // host2 is internal; host1 is external with a detected address
        let current = inv.host("host2").unwrap();
        let (commands, _) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].endpoint,
            Some(("1.2.3.4".to_string(), 51820))
        );
    }

    #[tokio::test]
    async fn no_endpoint_without_detected_address() {
        let mixed = r#"
[hosts.inner]
wireguard_addr = "10.10.0.1/24"

[hosts.outer]
wireguard_addr = "10.10.0.2/24"
"#;
        let (inv, reg) = fleet(mixed);
        let store = MemStore::new();
        store.put("outer", SLOT_PUBKEY, "PKO").await.unwrap();
        // outer published no address: nothing to dial
        let current = inv.host("inner").unwrap();
        let (commands, _) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(commands[0].endpoint, None);
    }

    #[tokio::test]
    async fn internal_peer_gets_endpoint_from_internal_host() {
        let both_internal = r#"
[hosts.a]
wireguard_addr = "10.10.0.1/24"

[hosts.b]
wireguard_addr = "10.10.0.2/24"
"#;
        let (inv, reg) = fleet(both_internal);
        let store = MemStore::new();
        store.put("b", SLOT_PUBKEY, "PKB").await.unwrap();
        store
            .put("b", &address_slot("enp1s0"), "10.1.1.2")
            .await
            .unwrap();

        let current = inv.host("a").unwrap();
        let (commands, _) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(
            commands[0].endpoint,
            Some(("10.1.1.2".to_string(), 51820))
        );
    }

    #[tokio::test]
    async fn internal_peer_with_address_gets_endpoint_from_external_host() {
        let (inv, reg) = fleet(TWO_HOSTS);
        let store = MemStore::new();
        store.put("host2", SLOT_PUBKEY, "PK2").await.unwrap();
        store
            .put("host2", &address_slot("eth0"), "10.1.1.2")
            .await
            .unwrap();

        // host1 is external, host2 internal: the detected address still
        // names the only dial target host1 has for host2.
        let current = inv.host("host1").unwrap();
        let (commands, _) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(
            commands[0].endpoint,
            Some(("10.1.1.2".to_string(), 51820))
        );
    }

    #[tokio::test]
    async fn keepalive_zero_means_no_clause() {
        let toml = r#"
[hosts.a]
wireguard_addr = "10.10.0.1/24"

[hosts.b]
wireguard_addr = "10.10.0.2/24"
persistent_keepalive = 0
"#;
        let (inv, reg) = fleet(toml);
        let store = MemStore::new();
        store.put("b", SLOT_PUBKEY, "PKB").await.unwrap();

        let current = inv.host("a").unwrap();
        let (commands, _) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(commands[0].persistent_keepalive, None);
        let args = commands[0].to_args("wg0");
        assert!(!args.contains(&"persistent-keepalive".to_string()));
    }

    #[tokio::test]
    async fn interface_priority_picks_first_candidate() {
        let (inv, reg) = fleet(TWO_HOSTS);
        let store = MemStore::new();
        store.put("host1", SLOT_PUBKEY, "PK1").await.unwrap();
        store
            .put("host1", &address_slot("eth0"), "203.0.113.9")
            .await
            .unwrap();
        store
            .put("host1", &address_slot("enp1s0"), "203.0.113.5")
            .await
            .unwrap();

        let current = inv.host("host2").unwrap();
        let (commands, _) = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(
            commands[0].endpoint,
            Some(("203.0.113.5".to_string(), 51820))
        );
    }

    #[tokio::test]
    async fn resolution_is_deterministic() {
        let (inv, reg) = fleet(TWO_HOSTS);
        let store = MemStore::new();
        store.put("host1", SLOT_PUBKEY, "PK1").await.unwrap();

        let current = inv.host("host2").unwrap();
        let first = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        let second = resolve_peers(current, &reg, &store, &interfaces())
            .await
            .unwrap();
        assert_eq!(first.0, second.0);
    }

    #[test]
    fn to_args_emits_full_binding() {
        let command = PeerCommand {
            host: "host1".to_string(),
            public_key: "PK1".to_string(),
            allowed_ips: "10.10.0.1/24".to_string(),
            endpoint: Some(("203.0.113.5".to_string(), 51820)),
            persistent_keepalive: Some(25),
        };
        assert_eq!(
            command.to_args("wg0"),
            vec![
                "wg",
                "set",
                "wg0",
                "peer",
                "PK1",
                "allowed-ips",
                "10.10.0.1/24",
                "endpoint",
                "203.0.113.5:51820",
                "persistent-keepalive",
                "25",
            ]
        );
    }
}
