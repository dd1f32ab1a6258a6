//! Error types for msh-core.

use thiserror::Error;

/// Main error type for msh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed `user[:password]@host` target.
    #[error("invalid target: {message}")]
    InvalidTarget { message: String },

    /// Invalid forward specification.
    #[error("invalid forward spec: {message}")]
    InvalidForwardSpec { message: String },

    /// The remote host could not be reached.
    #[error("can't connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// Authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The shell stream or SSH connection is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// A reply hook is already installed on the shell stream.
    #[error("request already pending")]
    RequestPending,

    /// A reply arrived but could not be interpreted.
    #[error("unexpected reply: {message}")]
    UnexpectedReply { message: String },

    /// Transport layer error (SSH session, channel requests).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// File transfer error.
    #[error("file transfer error: {message}")]
    FileTransfer { message: String },

    /// Port forward error.
    #[error("forward error: {message}")]
    Forward { message: String },

    /// A local side command was typed without its argument.
    #[error("{message}")]
    InvalidCommand { message: String },
}

impl Error {
    /// Returns true if this error must abort startup.
    ///
    /// Connection and parse errors happen before the shell is up; nothing
    /// can be recovered from them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. }
                | Error::AuthenticationFailed
                | Error::Timeout
                | Error::InvalidTarget { .. }
                | Error::InvalidForwardSpec { .. }
        )
    }
}

/// Convenience result type for msh operations.
pub type Result<T> = std::result::Result<T, Error>;
