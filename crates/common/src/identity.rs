//! Local identity setup (phase 1)
//!
//! Idempotent per-host sequence: install WireGuard, ensure the keypair,
//! bring up the mesh interface, detect candidate external addresses, and
//! publish the artifacts other hosts need to configure this one as a peer.
//!
//! The keypair is generated only if absent. Regenerating an existing key
//! would invalidate every peer's trust in this host.

use crate::inventory::{HostRecord, MeshSettings};
use crate::runner::{argv, run_checked, sh, CommandRunner};
use crate::store::{address_slot, ArtifactStore, SLOT_PUBKEY};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Phase-1 provisioning for one host
pub struct IdentitySetup<'a> {
    host: &'a HostRecord,
    mesh: &'a MeshSettings,
    runner: &'a dyn CommandRunner,
    store: &'a dyn ArtifactStore,
}

impl<'a> IdentitySetup<'a> {
    pub fn new(
        host: &'a HostRecord,
        mesh: &'a MeshSettings,
        runner: &'a dyn CommandRunner,
        store: &'a dyn ArtifactStore,
    ) -> Self {
        Self {
            host,
            mesh,
            runner,
            store,
        }
    }

    /// Run the full sequence. Safe to re-run; every step checks before it
    /// mutates. Failures are scoped to this host.
    pub async fn run(&self) -> Result<()> {
        let Some(mesh_addr) = self.host.mesh_addr.clone() else {
            debug!("{} has no mesh address, nothing to set up", self.host.name);
            return Ok(());
        };

        self.ensure_installed()
            .await
            .map_err(|e| Error::host_op(&self.host.name, "install", e))?;
        self.ensure_keypair()
            .await
            .map_err(|e| Error::host_op(&self.host.name, "keypair", e))?;
        self.ensure_interface(&mesh_addr)
            .await
            .map_err(|e| Error::host_op(&self.host.name, "interface", e))?;
        self.configure_interface()
            .await
            .map_err(|e| Error::host_op(&self.host.name, "configure", e))?;

        let addresses = self.detect_addresses().await;
        self.publish(&addresses)
            .await
            .map_err(|e| Error::host_op(&self.host.name, "publish", e))?;

        info!("{}: identity setup complete", self.host.name);
        Ok(())
    }

    /// Step 1: package install, gated on the distro fact
    async fn ensure_installed(&self) -> Result<()> {
        if !self.host.is_ubuntu() {
            debug!(
                "{}: distro {:?} not recognized, skipping package install",
                self.host.name, self.host.linux_name
            );
            return Ok(());
        }

        run_checked(
            self.runner,
            &sh("dpkg -s wireguard >/dev/null 2>&1 || apt-get install -y wireguard"),
        )
        .await?;

        run_checked(
            self.runner,
            &sh(&format!("ufw allow {}/udp", self.host.listen_port)),
        )
        .await?;
        Ok(())
    }

    /// Step 2: keypair at a fixed path, generated only if absent
    async fn ensure_keypair(&self) -> Result<()> {
        let dir = self.mesh.key_dir.display();
        let private_key = self.private_key_path();
        let public_key = self.public_key_path();

        run_checked(
            self.runner,
            &sh(&format!("mkdir -p {dir} && chmod 0700 {dir}")),
        )
        .await?;
        run_checked(
            self.runner,
            &sh(&format!(
                "test -f {private_key} || (umask 077 && wg genkey > {private_key})"
            )),
        )
        .await?;
        run_checked(
            self.runner,
            &sh(&format!("wg pubkey < {private_key} > {public_key}")),
        )
        .await?;
        Ok(())
    }

    /// Step 3: mesh interface present, addressed, and up
    async fn ensure_interface(&self, mesh_addr: &str) -> Result<()> {
        let iface = &self.mesh.interface;

        run_checked(
            self.runner,
            &sh(&format!(
                "ip link show {iface} >/dev/null 2>&1 || ip link add {iface} type wireguard"
            )),
        )
        .await?;

        // Re-running address assignment is expected to collide
        let out = self
            .runner
            .run(&argv(&["ip", "addr", "add", "dev", iface.as_str(), mesh_addr]))
            .await?;
        if !out.success && !out.stderr.contains("File exists") {
            return Err(Error::CommandFailed {
                program: format!("ip addr add dev {iface} {mesh_addr}"),
                stderr: out.stderr.trim().to_string(),
            });
        }

        run_checked(
            self.runner,
            &argv(&["ip", "link", "set", "up", "dev", iface.as_str()]),
        )
        .await?;
        Ok(())
    }

    /// Step 4: apply keypair and listen port
    async fn configure_interface(&self) -> Result<()> {
        let iface = &self.mesh.interface;
        run_checked(
            self.runner,
            &[
                "wg".to_string(),
                "set".to_string(),
                iface.clone(),
                "private-key".to_string(),
                self.private_key_path(),
            ],
        )
        .await?;
        run_checked(
            self.runner,
            &[
                "wg".to_string(),
                "set".to_string(),
                iface.clone(),
                "listen-port".to_string(),
                self.host.listen_port.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Step 5: probe candidate interfaces for assigned addresses.
    /// Per-interface failures are non-fatal; an interface without an address
    /// simply produces no artifact.
    async fn detect_addresses(&self) -> Vec<(String, String)> {
        let mut addresses = Vec::new();
        for iface in &self.mesh.interfaces {
            let result = self
                .runner
                .run(&argv(&["ip", "-o", "-4", "addr", "show", iface.as_str()]))
                .await;
            match result {
                Ok(out) if out.success => {
                    if let Some(addr) = first_inet_addr(&out.stdout) {
                        addresses.push((iface.clone(), addr));
                    }
                }
                Ok(out) => {
                    debug!(
                        "{}: no address on {}: {}",
                        self.host.name,
                        iface,
                        out.stderr.trim()
                    );
                }
                Err(e) => {
                    warn!("{}: probing {} failed: {}", self.host.name, iface, e);
                }
            }
        }
        addresses
    }

    /// Step 6: publish public key and detected addresses
    async fn publish(&self, addresses: &[(String, String)]) -> Result<()> {
        let out = run_checked(self.runner, &sh(&format!("cat {}", self.public_key_path()))).await?;
        let public_key = out.stdout.trim();
        if public_key.is_empty() {
            return Err(Error::Validation(format!(
                "{}: empty public key at {}",
                self.host.name,
                self.public_key_path()
            )));
        }

        self.store
            .put(&self.host.name, SLOT_PUBKEY, public_key)
            .await?;
        for (iface, addr) in addresses {
            self.store
                .put(&self.host.name, &address_slot(iface), addr)
                .await?;
        }
        Ok(())
    }

    fn private_key_path(&self) -> String {
        self.mesh.key_dir.join("private.key").display().to_string()
    }

    fn public_key_path(&self) -> String {
        self.mesh.key_dir.join("public.key").display().to_string()
    }
}

/// Extract the first inet address from `ip -o -4 addr show` output
fn first_inet_addr(output: &str) -> Option<String> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "inet" {
            return tokens
                .next()
                .map(|cidr| cidr.split('/').next().unwrap_or(cidr).to_string());
        }
    }
    None
}
