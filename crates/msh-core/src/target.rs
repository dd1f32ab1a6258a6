//! Connection target parsing.
//!
//! Targets look like `user[:password]@host`. The port comes from `-p`.
//! Without a password the client authenticates through the SSH agent named
//! by `SSH_AUTH_SOCK`, when one is set.

use std::fmt;
use std::path::PathBuf;

use crate::constants::{AGENT_SOCKET_ENV, DEFAULT_SSH_PORT};
use crate::{Error, Result};

/// How the client authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Password given in the target string.
    Password(String),
    /// SSH agent listening on this socket.
    Agent(PathBuf),
    /// No credentials available; the server decides.
    None,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(<redacted>)"),
            Auth::Agent(path) => f.debug_tuple("Agent").field(path).finish(),
            Auth::None => f.write_str("None"),
        }
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: Auth,
}

impl ConnectInfo {
    /// `host:port`, suitable for `ToSocketAddrs`.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parse a target, reading the agent socket from the environment.
pub fn parse_connect(target: &str, port: Option<u16>) -> Result<ConnectInfo> {
    let agent = std::env::var_os(AGENT_SOCKET_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    parse_connect_with_agent(target, port, agent)
}

/// Parse a target with an explicit agent socket.
///
/// The host is everything after the last `@`, so passwords may contain `@`.
/// The password is everything after the first `:` of the user part.
pub fn parse_connect_with_agent(
    target: &str,
    port: Option<u16>,
    agent: Option<PathBuf>,
) -> Result<ConnectInfo> {
    let (user_part, host) = target
        .rsplit_once('@')
        .ok_or_else(|| invalid(format!("expected user[:password]@host, got: {target}")))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let (username, password) = match user_part.split_once(':') {
        Some((user, pass)) => (user, Some(pass)),
        None => (user_part, None),
    };
    if username.is_empty() {
        return Err(invalid("missing username"));
    }

    let auth = match (password, agent) {
        (Some(pass), _) => Auth::Password(pass.to_string()),
        (None, Some(socket)) => Auth::Agent(socket),
        (None, None) => Auth::None,
    };

    Ok(ConnectInfo {
        host: host.to_string(),
        port: port.unwrap_or(DEFAULT_SSH_PORT),
        username: username.to_string(),
        auth,
    })
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidTarget {
        message: message.into(),
    }
}
