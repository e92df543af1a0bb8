//! Setup Command (phase 1)
//!
//! Runs baseline provisioning and WireGuard identity setup for the current
//! host, publishing its artifacts to the shared store. Fleet validation runs
//! first: an address collision aborts before any mutation.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;
use tracing::debug;

use fleetwire_common::baseline::BaselineSetup;
use fleetwire_common::identity::IdentitySetup;
use fleetwire_common::{FsStore, Inventory, LocalRunner, Registry};

use crate::output::{print_info, print_success, OutputFormat};

#[derive(Args)]
pub struct SetupArgs {
    /// Host to provision (defaults to the local hostname)
    #[arg(long)]
    pub host: Option<String>,

    /// Skip the baseline package/service pass
    #[arg(long)]
    pub skip_baseline: bool,
}

/// Resolve the host name this invocation provisions
pub fn target_host(arg: &Option<String>) -> Result<String> {
    match arg {
        Some(name) => Ok(name.clone()),
        None => Ok(hostname::get()
            .context("cannot determine local hostname")?
            .to_string_lossy()
            .into_owned()),
    }
}

pub async fn execute(
    args: SetupArgs,
    inventory: &Path,
    store_path: &Path,
    _format: OutputFormat,
) -> Result<()> {
    let inv = Inventory::load(inventory)?;

    // Fleet-wide invariant check before any mutation
    Registry::from_inventory(&inv).validate()?;

    let name = target_host(&args.host)?;
    debug!("provisioning target: {name}");
    let host = inv
        .require(&name)
        .with_context(|| format!("in inventory {}", inventory.display()))?;

    let runner = LocalRunner;
    let store = FsStore::new(store_path).await?;

    if !args.skip_baseline {
        BaselineSetup::new(host, &runner).run().await?;
        print_success(&format!("{name}: baseline setup done"));
    }

    if host.in_mesh() {
        IdentitySetup::new(host, &inv.mesh, &runner, &store)
            .run()
            .await?;
        print_success(&format!(
            "{name}: identity published to {}",
            store_path.display()
        ));
        print_info("run `fleetwire peers --apply` once every host has published");
    } else {
        print_info(&format!("{name}: no mesh address, identity setup skipped"));
    }

    Ok(())
}
