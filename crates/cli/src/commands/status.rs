//! Status Command
//!
//! Shows what each mesh participant has published to the shared store, so
//! the operator can tell when phase 1 has settled fleet-wide.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;

use fleetwire_common::mesh::load_artifact;
use fleetwire_common::store::SLOT_PUBKEY;
use fleetwire_common::{ArtifactStore, FsStore, Inventory, Registry};

use crate::output::{print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct StatusArgs {}

#[derive(Serialize)]
struct StatusRow {
    host: String,
    mesh_addr: String,
    published: bool,
    detected_addr: Option<String>,
    published_at: Option<String>,
}

impl TableDisplay for StatusRow {
    fn headers() -> Vec<&'static str> {
        vec!["Host", "Mesh Addr", "Pubkey", "Detected Addr", "Published At"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.host.clone(),
            self.mesh_addr.clone(),
            if self.published { "✓" } else { "✗" }.to_string(),
            self.detected_addr.clone().unwrap_or("-".to_string()),
            self.published_at.clone().unwrap_or("-".to_string()),
        ]
    }
}

pub async fn execute(
    _args: StatusArgs,
    inventory: &Path,
    store_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let inv = Inventory::load(inventory)?;
    let registry = Registry::from_inventory(&inv);
    let store = FsStore::new(store_path).await?;

    let mut rows = Vec::new();
    let mut pending = 0usize;

    for host in registry.hosts() {
        let artifact = load_artifact(&store, &host.name, &inv.mesh.interfaces).await?;
        let published = artifact.public_key.is_some();
        if !published {
            pending += 1;
        }

        let published_at = store
            .modified(&host.name, SLOT_PUBKEY)
            .await?
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());

        rows.push(StatusRow {
            host: host.name.clone(),
            mesh_addr: host.mesh_addr.clone().unwrap_or_default(),
            published,
            detected_addr: artifact.effective_addr().map(|a| a.to_string()),
            published_at,
        });
    }

    print_list(&rows, format);

    if pending == 0 {
        print_success("all participants have published; phase 2 is safe to run");
    } else {
        print_warning(&format!(
            "{pending} of {} participants have not published yet",
            registry.hosts().len()
        ));
        print_info("run `fleetwire setup` on the pending hosts first");
    }

    Ok(())
}
