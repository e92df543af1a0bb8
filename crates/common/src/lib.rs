//! Fleetwire Common Library
//!
//! Shared types and provisioning logic for the Fleetwire platform:
//! cloud-init document generation and WireGuard mesh coordination.

pub mod baseline;
pub mod document;
pub mod embed;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod mesh;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use error::{Error, Result};
pub use inventory::{HostRecord, Inventory, MeshSettings};
pub use mesh::{PeerCommand, SkippedPeer};
pub use registry::Registry;
pub use runner::{CommandRunner, LocalRunner};
pub use store::{ArtifactStore, FsStore};

/// Fleetwire version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".fleetwire")
}

/// Default shared artifact store location
pub fn default_artifact_path() -> std::path::PathBuf {
    default_store_path().join("artifacts")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
