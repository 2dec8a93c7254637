//! Streaming file transfer with partial-file cleanup
//!
//! Every backend funnels downloads through [`write_stream`]. The destination
//! is prepared (parent directory created, stale entry removed), then chunks
//! are appended while progress is reported. A [`PartialFile`] guard removes
//! the half-written file on every exit path except a completed transfer,
//! including cancellation and the future being dropped.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use treemirror_core::domain::UpdateError;
use treemirror_core::ports::ProgressFn;

/// Boxed stream of content chunks as produced by the backend clients
pub type ByteStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;

/// Removes the file at `path` when dropped, unless [`commit`](Self::commit)ted
#[derive(Debug)]
pub struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file: the transfer finished.
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial file"),
        }
    }
}

/// Creates the parent directory of `destination` and removes whatever
/// currently occupies it. A directory in the way is removed recursively.
pub async fn prepare_destination(destination: &Path) -> Result<(), UpdateError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| UpdateError::io(parent, e))?;
    }

    let metadata = match tokio::fs::symlink_metadata(destination).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(UpdateError::io(destination, e)),
    };

    let removed = if metadata.is_dir() {
        debug!(path = %destination.display(), "Replacing directory with downloaded file");
        tokio::fs::remove_dir_all(destination).await
    } else {
        tokio::fs::remove_file(destination).await
    };
    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdateError::io(destination, e)),
    }
}

/// Writes `stream` to `destination`, returning the number of bytes written.
///
/// `total` is the size the backend announced, 0 when unknown. A stream that
/// ends with a different byte count is a [`UpdateError::Transfer`] and the
/// partial file is removed, as for stream errors. Local write errors are
/// [`UpdateError::Io`].
pub async fn write_stream(
    destination: &Path,
    total: u64,
    mut stream: ByteStream,
    progress: Option<ProgressFn>,
    cancel: &CancellationToken,
) -> Result<u64, UpdateError> {
    if cancel.is_cancelled() {
        return Err(UpdateError::Cancelled);
    }

    prepare_destination(destination).await?;

    let guard = PartialFile::new(destination);
    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| UpdateError::io(destination, e))?;

    let mut written: u64 = 0;
    if let Some(report) = &progress {
        report(0, total);
    }

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(path = %destination.display(), written, "Transfer cancelled");
                return Err(UpdateError::Cancelled);
            }
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };

        let chunk = chunk.map_err(|source| UpdateError::Transfer {
            path: destination.to_path_buf(),
            source,
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| UpdateError::io(destination, e))?;

        written += chunk.len() as u64;
        trace!(path = %destination.display(), written, total, "Chunk written");
        if let Some(report) = &progress {
            report(written, total);
        }
    }

    file.flush()
        .await
        .map_err(|e| UpdateError::io(destination, e))?;
    drop(file);

    if total > 0 && written != total {
        warn!(
            path = %destination.display(),
            written,
            expected = total,
            "Transferred size differs from announced size"
        );
        return Err(UpdateError::Transfer {
            path: destination.to_path_buf(),
            source: anyhow::anyhow!("received {written} of {total} bytes"),
        });
    }

    guard.commit();
    debug!(path = %destination.display(), bytes = written, "Transfer complete");
    Ok(written)
}

/// Collects a stream into memory. Used for small files such as the manifest.
pub async fn read_to_vec(
    name: &str,
    mut stream: ByteStream,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, UpdateError> {
    let mut buffer = Vec::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
            Some(Err(source)) => {
                return Err(UpdateError::Transfer {
                    path: PathBuf::from(name),
                    source,
                })
            }
            None => return Ok(buffer),
        }
    }
}
