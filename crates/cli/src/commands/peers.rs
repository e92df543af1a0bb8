//! Peers Command (phase 2)
//!
//! Resolves the peer command set for the current host from the registry and
//! the shared artifact store, prints the run summary, and optionally applies
//! the commands. Pure resolution: safe to re-run until the fleet converges.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use std::path::Path;
use tracing::debug;

use fleetwire_common::mesh::{apply_peers, resolve_peers};
use fleetwire_common::{FsStore, Inventory, LocalRunner, PeerCommand, Registry};

use crate::commands::setup::target_host;
use crate::output::{print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct PeersArgs {
    /// Host to resolve peers for (defaults to the local hostname)
    #[arg(long)]
    pub host: Option<String>,

    /// Execute the resolved `wg set` commands instead of only printing them
    #[arg(long)]
    pub apply: bool,
}

impl TableDisplay for PeerCommand {
    fn headers() -> Vec<&'static str> {
        vec!["Peer", "Allowed IPs", "Endpoint", "Keepalive", "Public Key"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.host.clone(),
            self.allowed_ips.clone(),
            self.endpoint
                .as_ref()
                .map(|(addr, port)| format!("{addr}:{port}"))
                .unwrap_or("-".to_string()),
            self.persistent_keepalive
                .map(|k| format!("{k}s"))
                .unwrap_or("off".to_string()),
            self.public_key.chars().take(12).collect::<String>() + "…",
        ]
    }
}

pub async fn execute(
    args: PeersArgs,
    inventory: &Path,
    store_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let inv = Inventory::load(inventory)?;
    let registry = Registry::from_inventory(&inv);

    // Collision check still gates phase 2: never push peers for a fleet with
    // a conflicting identity assignment.
    registry.validate()?;

    let name = target_host(&args.host)?;
    let Some(current) = registry.get(&name) else {
        bail!("host {name} is not a mesh participant");
    };

    let store = FsStore::new(store_path).await?;
    let (commands, skipped) =
        resolve_peers(current, &registry, &store, &inv.mesh.interfaces).await?;
    debug!(
        "{name}: {} peer commands resolved, {} skipped",
        commands.len(),
        skipped.len()
    );

    print_list(&commands, format);
    for skip in &skipped {
        print_warning(&format!(
            "peer {} skipped: {} (re-run after it publishes)",
            skip.host.bold(),
            skip.reason
        ));
    }

    if args.apply {
        let runner = LocalRunner;
        apply_peers(&runner, &inv.mesh.interface, &commands).await?;
        print_success(&format!(
            "{name}: {} peers configured on {}",
            commands.len(),
            inv.mesh.interface
        ));
    } else {
        print_info(&format!(
            "{} peer commands resolved for {name} (use --apply to execute)",
            commands.len()
        ));
    }

    if !skipped.is_empty() {
        print_info(&format!(
            "{} of {} peers pending publish",
            skipped.len(),
            registry.hosts().len() - 1
        ));
    }

    Ok(())
}
