//! File transfer for the `get` / `put` side commands.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use msh_core::{Error, Result};

use crate::ssh::SshConnection;

/// Moves whole files between the local and remote hosts.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Copy `remote` to `local`. Returns the byte count.
    async fn download(&self, remote: &str, local: &Path) -> Result<u64>;

    /// Copy `local` to `remote`. Returns the byte count.
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64>;
}

/// SFTP-backed transfers. Each transfer opens its own SFTP channel.
pub struct SftpTransfer {
    connection: Arc<SshConnection>,
}

impl SftpTransfer {
    pub fn new(connection: Arc<SshConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        debug!(remote, local = %local.display(), "Starting download");
        let sftp = self.connection.open_sftp().await?;

        let mut src = sftp.open(remote).await.map_err(|e| sftp_error(remote, e))?;
        let partial = partial_path(local)?;
        let copied = async {
            let mut dst = tokio::fs::File::create(&partial).await?;
            let bytes = tokio::io::copy(&mut src, &mut dst).await?;
            dst.flush().await?;
            Ok::<_, Error>(bytes)
        }
        .await;
        let _ = sftp.close().await;

        let bytes = finish_partial(&partial, local, copied).await?;
        info!(remote, local = %local.display(), bytes, "Download complete");
        Ok(bytes)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        debug!(local = %local.display(), remote, "Starting upload");
        ensure_regular_file(local).await?;
        let mut src = tokio::fs::File::open(local).await?;
        let sftp = self.connection.open_sftp().await?;

        let mut dst = sftp.create(remote).await.map_err(|e| sftp_error(remote, e))?;
        let bytes = tokio::io::copy(&mut src, &mut dst).await?;
        dst.shutdown().await?;

        let _ = sftp.close().await;
        info!(local = %local.display(), remote, bytes, "Upload complete");
        Ok(bytes)
    }
}

fn sftp_error(path: &str, e: impl std::fmt::Display) -> Error {
    Error::FileTransfer {
        message: format!("{path}: {e}"),
    }
}

/// Hidden sibling of `local` that a download is written to first.
fn partial_path(local: &Path) -> Result<PathBuf> {
    let name = local.file_name().ok_or_else(|| Error::FileTransfer {
        message: format!("not a file: {}", local.display()),
    })?;
    let mut partial = OsString::from(".");
    partial.push(name);
    partial.push(".part");
    Ok(local.with_file_name(partial))
}

/// Move a finished download into place, or drop what was written.
///
/// An existing `local` is only replaced once the copy succeeded.
async fn finish_partial(partial: &Path, local: &Path, copied: Result<u64>) -> Result<u64> {
    match copied {
        Ok(bytes) => {
            tokio::fs::rename(partial, local).await?;
            Ok(bytes)
        }
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(partial).await
                && remove.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %partial.display(), error = %remove, "Failed to remove partial download");
            }
            Err(e)
        }
    }
}

/// Fail unless `local` is a regular file.
async fn ensure_regular_file(local: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(local)
        .await
        .map_err(|e| Error::FileTransfer {
            message: format!("{}: {e}", local.display()),
        })?;
    if !metadata.is_file() {
        return Err(Error::FileTransfer {
            message: format!("{}: not a regular file", local.display()),
        });
    }
    Ok(())
}
