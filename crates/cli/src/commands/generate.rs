//! Generate Command
//!
//! Assembles the cloud-init document from a TOML manifest plus an optional
//! directory of files to embed.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use fleetwire_common::schema::CloudConfig;
use fleetwire_common::{document, embed};

use crate::output::{print_success, OutputFormat};

#[derive(Args)]
pub struct GenerateArgs {
    /// Manifest describing users, packages, datasource, and commands
    #[arg(long, default_value = "cloudinit.toml")]
    pub manifest: PathBuf,

    /// Directory whose files are embedded at their relative paths
    #[arg(long)]
    pub rootdir: Option<PathBuf>,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: GenerateArgs, _format: OutputFormat) -> Result<()> {
    let mut config = CloudConfig::load_manifest(&args.manifest)?;
    debug!("loaded manifest {}", args.manifest.display());

    if let Some(rootdir) = &args.rootdir {
        config.write_files = embed::embed_dir(rootdir)?;
        debug!(
            "embedded {} files from {}",
            config.write_files.len(),
            rootdir.display()
        );
    }

    config.validate()?;
    let doc = document::assemble(&config)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &doc)?;
            print_success(&format!(
                "Wrote cloud-init document to {} ({} embedded files)",
                path.display(),
                config.write_files.len()
            ));
        }
        None => {
            print!("{doc}");
        }
    }

    Ok(())
}
