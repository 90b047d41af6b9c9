//! Local file transfer helpers.
//!
//! A download into a local file goes through [`PartialFile`]: unless the
//! copy completes, the file is removed when the guard drops. That covers
//! errors as well as a future dropped mid-transfer.

use crate::error::Result;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Deletes the file at `path` on drop unless [`keep`](Self::keep) was called.
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

    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial download"),
        }
    }
}

/// Copy `reader` into a new file at `destination`, returning the byte count.
pub async fn copy_to_file<R>(reader: &mut R, destination: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let file = tokio::fs::File::create(destination).await?;
    let guard = PartialFile::new(destination);

    // The handle is closed by the time the guard runs, success or not
    let written = write_stream(reader, file).await?;

    guard.keep();
    debug!(path = %destination.display(), bytes = written, "Download written");
    Ok(written)
}

/// Copy `reader` into `file` and sync it. Consumes the handle so it is closed
/// when this returns.
async fn write_stream<R>(reader: &mut R, mut file: tokio::fs::File) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let written = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Buffer a whole stream.
pub async fn read_all<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

/// Read a local file for upload.
pub async fn read_local_file(path: &Path) -> Result<Bytes> {
    Ok(Bytes::from(tokio::fs::read(path).await?))
}
