//! Check Command
//!
//! Fleet-wide validation: loads the inventory and enforces the
//! one-address-per-host invariant before anything is provisioned.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use fleetwire_common::{HostRecord, Inventory, Registry};

use crate::output::{print_error, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct CheckArgs {
    /// Only report, do not exit non-zero on validation failure
    #[arg(long)]
    pub no_fail: bool,
}

#[derive(Serialize)]
struct HostRow<'a> {
    #[serde(flatten)]
    host: &'a HostRecord,
}

impl TableDisplay for HostRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Host", "Mesh Addr", "Port", "External", "Keepalive", "Distro"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.host.name.clone(),
            self.host.mesh_addr.clone().unwrap_or("-".to_string()),
            self.host.listen_port.to_string(),
            self.host.external.to_string(),
            if self.host.persistent_keepalive > 0 {
                format!("{}s", self.host.persistent_keepalive)
            } else {
                "off".to_string()
            },
            self.host.linux_name.clone().unwrap_or("-".to_string()),
        ]
    }
}

pub async fn execute(args: CheckArgs, inventory: &Path, format: OutputFormat) -> Result<()> {
    let inv = Inventory::load(inventory)?;
    let registry = Registry::from_inventory(&inv);

    let rows: Vec<HostRow> = inv.hosts.iter().map(|host| HostRow { host }).collect();
    print_list(&rows, format);

    match registry.validate() {
        Ok(()) => {
            print_success(&format!(
                "{} hosts, {} mesh participants, no address collisions",
                inv.hosts.len(),
                registry.hosts().len()
            ));
            Ok(())
        }
        Err(e) => {
            print_error(&e.to_string());
            if args.no_fail {
                Ok(())
            } else {
                bail!("inventory validation failed");
            }
        }
    }
}
