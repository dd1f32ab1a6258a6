//! msh-client: interactive SSH shell client.
//!
//! Provides:
//! - CLI argument parsing
//! - SSH transport (shell, SFTP, forwarding channels)
//! - The shell session task and its handle
//! - Line input with remote tab completion
//! - `get` / `put` routing and file transfer
//! - Local and remote port forwarding relays
//! - Connection lifecycle and teardown

pub mod cli;
pub mod forward;
pub mod input;
pub mod lifecycle;
pub mod router;
pub mod session;
pub mod ssh;
pub mod terminal;
pub mod transfer;

pub use cli::{Cli, CliLogFormat};
pub use forward::{ForwardOpener, LocalForwarder, RemoteForwarder};
pub use input::{InputEvent, LineReader, RemoteCompleter, completion_candidate};
pub use lifecycle::{Disconnector, InterruptAction, Lifecycle, LinkState, Teardown};
pub use router::{CommandRouter, LocalCommand, Route, Routed, route};
pub use session::{SessionCommand, SessionHandle, ShellSession};
pub use ssh::{ShellChannel, ShellWriter, SshConfig, SshConnection};
pub use terminal::{TermSize, TerminalModeGuard, get_terminal_size, stdout_sink};
pub use transfer::{FileTransfer, SftpTransfer};
