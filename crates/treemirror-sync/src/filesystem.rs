//! Local filesystem access for reconciliation
//!
//! - [`list_directory`] - Immediate entries of a local directory with their state
//! - [`remove_path`] - Removes a file or a directory tree
//!
//! Symlinks are followed when reading state, so a link to a file compares
//! like the file. Removal never follows links.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use treemirror_core::domain::UpdateError;
use treemirror_core::versioning::LocalFileState;

/// One entry of a local directory
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub state: LocalFileState,
}

/// Lists the immediate entries of `dir`, sorted by name.
///
/// A missing path, or a path that is not a directory, has no entries.
#[instrument(level = "debug", fields(dir = %dir.display()))]
pub async fn list_directory(dir: &Path) -> Result<Vec<LocalEntry>, UpdateError> {
    match tokio::fs::metadata(dir).await {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            debug!("not a directory");
            return Ok(Vec::new());
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("directory not found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(UpdateError::io(dir, e)),
    }

    let mut reader = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| UpdateError::io(dir, e))?;
    let mut entries = Vec::new();

    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| UpdateError::io(dir, e))?
    {
        let path = entry.path();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Dangling symlink: describe the link itself.
            Err(e) if e.kind() == ErrorKind::NotFound => entry
                .metadata()
                .await
                .map_err(|e| UpdateError::io(&path, e))?,
            Err(e) => return Err(UpdateError::io(&path, e)),
        };

        entries.push(LocalEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            state: LocalFileState::from_metadata(&metadata),
            path,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = entries.len(), "listed local directory");
    Ok(entries)
}

/// Removes a file, or a directory recursively. A missing target is success.
#[instrument(level = "debug", fields(path = %path.display()))]
pub async fn remove_path(path: &Path) -> Result<(), UpdateError> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("already absent");
            return Ok(());
        }
        Err(e) => return Err(UpdateError::io(path, e)),
    };

    let result = if metadata.is_dir() {
        debug!("removing directory recursively");
        tokio::fs::remove_dir_all(path).await
    } else {
        debug!("removing file");
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdateError::io(path, e)),
    }
}
