//! File embedding
//!
//! Walks a source tree and turns every regular file into a `write_files`
//! entry: base64 content, four-digit octal permissions, and the source path
//! with the root prefix stripped so it lands at the same absolute path on the
//! destination host.
//!
//! The walk is aborted on the first unreadable file. A provisioning document
//! silently missing an expected file is a correctness hazard, so there is no
//! partial result.

use crate::schema::WriteFile;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Embed every regular file under `root`, sorted by target path for
/// reproducible output.
pub fn embed_dir(root: impl AsRef<Path>) -> Result<Vec<WriteFile>> {
    let root = root.as_ref();
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let data = std::fs::read(entry.path())?;
        let mode = entry
            .metadata()
            .map_err(std::io::Error::from)?
            .permissions()
            .mode();

        let rel = entry.path().strip_prefix(root).map_err(|_| {
            Error::Internal(format!("walked outside root: {}", entry.path().display()))
        })?;

        files.push(WriteFile {
            path: format!("/{}", rel.display()),
            content: STANDARD.encode(&data),
            permissions: format!("{:04o}", mode & 0o7777),
            owner: "root:root".to_string(),
            encoding: "b64".to_string(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("embedded {} files from {}", files.len(), root.display());
    Ok(files)
}
