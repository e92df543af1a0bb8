//! Shared artifact store
//!
//! The cross-host synchronization medium for the mesh: each host publishes
//! its public key and detected addresses here during phase 1, and reads every
//! other host's artifacts during phase 2. Last write wins per (host, slot).
//!
//! Slots: `pubkey`, and `address.<interface>` per candidate interface.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Public-key slot name
pub const SLOT_PUBKEY: &str = "pubkey";

/// Slot name for a detected interface address
pub fn address_slot(interface: &str) -> String {
    format!("address.{interface}")
}

/// Minimal key-value interface over the shared store, so the coordination
/// backend can change without touching mesh resolution.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Publish a value, overwriting any previous one
    async fn put(&self, host: &str, slot: &str, value: &str) -> Result<()>;

    /// Read a value; `None` means the host has not published this slot
    async fn get(&self, host: &str, slot: &str) -> Result<Option<String>>;

    /// When the slot was last written, if the backend tracks it
    async fn modified(&self, _host: &str, _slot: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}

/// Filesystem-backed store: one file per (host, slot) under a shared root
/// directory (NFS mount, synced folder, ...).
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create the store, making the root directory if needed
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn slot_path(&self, host: &str, slot: &str) -> PathBuf {
        self.root.join(format!("{host}.{slot}"))
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put(&self, host: &str, slot: &str, value: &str) -> Result<()> {
        let path = self.slot_path(host, slot);

        // Write atomically via temp file so readers never see partial values
        let tmp = self.root.join(format!(".{host}.{slot}.tmp"));
        fs::write(&tmp, value.trim()).await?;
        fs::rename(&tmp, &path).await?;

        debug!("published {}.{}", host, slot);
        Ok(())
    }

    async fn get(&self, host: &str, slot: &str) -> Result<Option<String>> {
        let path = self.slot_path(host, slot);
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn modified(&self, host: &str, slot: &str) -> Result<Option<DateTime<Utc>>> {
        let path = self.slot_path(host, slot);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.modified().ok().map(DateTime::<Utc>::from)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests
#[derive(Debug, Default)]
pub struct MemStore {
    slots: Mutex<HashMap<(String, String), String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemStore {
    async fn put(&self, host: &str, slot: &str, value: &str) -> Result<()> {
        self.slots
            .lock()
            .map_err(|e| crate::Error::Internal(e.to_string()))?
            .insert((host.to_string(), slot.to_string()), value.trim().to_string());
        Ok(())
    }

    async fn get(&self, host: &str, slot: &str) -> Result<Option<String>> {
        Ok(self
            .slots
            .lock()
            .map_err(|e| crate::Error::Internal(e.to_string()))?
            .get(&(host.to_string(), slot.to_string()))
            .cloned())
    }
}
