//! Command routing.
//!
//! Typed lines are either local side commands (`get <file>`, `put <file>`)
//! or go to the remote shell untouched.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use msh_core::{Error, Result};

use crate::session::SessionHandle;
use crate::transfer::FileTransfer;

/// Local side commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalCommand {
    Get,
    Put,
}

/// Where a typed line goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    /// Send to the remote shell.
    Remote,
    /// Run locally on `path`.
    Local(LocalCommand, &'a str),
    /// `get` or `put` with no file name.
    MissingPath(LocalCommand),
}

/// Classify a typed line.
///
/// The keyword must be followed by whitespace or the end of the line, so
/// `getent` and `puts` still go to the remote.
pub fn route(line: &str) -> Route<'_> {
    let trimmed = line.trim();
    let (command, rest) = if let Some(rest) = trimmed.strip_prefix("get") {
        (LocalCommand::Get, rest)
    } else if let Some(rest) = trimmed.strip_prefix("put") {
        (LocalCommand::Put, rest)
    } else {
        return Route::Remote;
    };

    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Route::Remote;
    }

    match rest.trim() {
        "" => Route::MissingPath(command),
        path => Route::Local(command, path),
    }
}

/// What a routed line did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Sent to the remote shell.
    Forwarded,
    /// A file was transferred.
    Transferred {
        command: LocalCommand,
        source: String,
        destination: String,
        bytes: u64,
    },
}

/// Routes typed lines to the remote shell or to file transfers.
///
/// Transfers report progress on the terminal, between the shell output,
/// as `msh: ` status lines.
pub struct CommandRouter {
    session: SessionHandle,
    transfer: Arc<dyn FileTransfer>,
    host: String,
    local_dir: PathBuf,
}

impl CommandRouter {
    pub fn new(
        session: SessionHandle,
        transfer: Arc<dyn FileTransfer>,
        host: impl Into<String>,
        local_dir: PathBuf,
    ) -> Self {
        Self {
            session,
            transfer,
            host: host.into(),
            local_dir,
        }
    }

    /// Handle one typed line, reporting failures on stderr.
    ///
    /// Failures never end the session.
    pub async fn handle(&self, line: &str) {
        if let Err(e) = self.on_input_line(line).await {
            error!(error = %e, "Command failed");
            eprintln!("msh: {e}");
        }
    }

    /// Route one typed line.
    pub async fn on_input_line(&self, line: &str) -> Result<Routed> {
        match route(line) {
            Route::Remote => {
                self.session.send_line(line).await?;
                Ok(Routed::Forwarded)
            }
            Route::MissingPath(_) => Err(Error::InvalidCommand {
                message: "you must specify a file name with get or put".into(),
            }),
            Route::Local(LocalCommand::Get, path) => self.get(path).await,
            Route::Local(LocalCommand::Put, path) => self.put(path).await,
        }
    }

    async fn get(&self, path: &str) -> Result<Routed> {
        let dir = self.session.current_dir().await?;
        let remote = remote_join(&dir.cwd, path);
        let name = remote_basename(&remote)?;
        let local = self.local_dir.join(name);

        self.status(format!(
            "Downloading {}:{remote} to {}/...",
            self.host,
            self.local_dir.display()
        ))
        .await;
        let bytes = self.transfer.download(&remote, &local).await?;
        info!(remote = %remote, local = %local.display(), bytes, "get complete");
        self.status("File has been downloaded successfully.").await;
        self.redisplay_prompt(&dir.prompt).await;

        Ok(Routed::Transferred {
            command: LocalCommand::Get,
            source: remote,
            destination: local.display().to_string(),
            bytes,
        })
    }

    async fn put(&self, path: &str) -> Result<Routed> {
        let dir = self.session.current_dir().await?;
        let local = normalize_local(&self.local_dir.join(path));
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::FileTransfer {
                message: format!("not a file: {path}"),
            })?;
        let remote = remote_join(&dir.cwd, name);

        self.status(format!(
            "Uploading {} to {}:{}/...",
            local.display(),
            self.host,
            dir.cwd.trim_end_matches('/')
        ))
        .await;
        let bytes = self.transfer.upload(&local, &remote).await?;
        info!(local = %local.display(), remote = %remote, bytes, "put complete");
        self.status("File has been uploaded successfully.").await;
        self.redisplay_prompt(&dir.prompt).await;

        Ok(Routed::Transferred {
            command: LocalCommand::Put,
            source: local.display().to_string(),
            destination: remote,
            bytes,
        })
    }

    async fn status(&self, message: impl AsRef<str>) {
        let _ = self
            .session
            .display(format!("msh: {}\r\n", message.as_ref()))
            .await;
    }

    /// The `pwd` query consumed the shell's prompt; draw it again.
    async fn redisplay_prompt(&self, prompt: &str) {
        if prompt.is_empty() {
            return;
        }
        let _ = self.session.display(format!("{prompt} ")).await;
    }
}

/// Resolve `path` against the remote `cwd`, POSIX style.
pub fn remote_join(cwd: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

fn remote_basename(path: &str) -> Result<&str> {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(Error::FileTransfer {
            message: format!("not a file: {path}"),
        }),
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize_local(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
