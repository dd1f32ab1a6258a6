//! Port forward specification parsing.
//!
//! SSH-style `-L` / `-R` syntax: `[bind_host:]bind_port:connect_host:connect_port`.
//! Hosts may be bracketed IPv6 literals (`[::1]:8080:localhost:80`). The
//! short form `bind_host:bind_port:connect_port` targets 127.0.0.1.

use std::fmt;

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CONNECT_HOST};
use crate::{Error, Result};

/// Direction of a forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardKind {
    /// Client listens, the remote side connects to the target (-L).
    Local,
    /// Remote side listens, the client connects to the target (-R).
    Remote,
}

impl fmt::Display for ForwardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardKind::Local => f.write_str("local"),
            ForwardKind::Remote => f.write_str("remote"),
        }
    }
}

/// Parsed forward addressing. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    /// Host the listener binds to.
    pub bind_host: String,
    /// Port the listener binds to.
    pub bind_port: u16,
    /// Host connections are relayed to.
    pub connect_host: String,
    /// Port connections are relayed to.
    pub connect_port: u16,
}

impl ForwardSpec {
    /// Parse `[bind_host:]bind_port:connect_host:connect_port`.
    ///
    /// Examples:
    /// - `bindaddr:8000:localhost:8080`
    /// - `8000:localhost:8080` (binds 127.0.0.1)
    /// - `0.0.0.0:8000:8080` (connects to 127.0.0.1)
    /// - `[::1]:8080:[fe80::1]:80`
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(invalid("empty specification"));
        }

        let fields = split_fields(s)?;

        match fields.as_slice() {
            // bind_host:bind_port:connect_host:connect_port
            [bind_host, bind_port, connect_host, connect_port] => Ok(Self {
                bind_host: host_field(bind_host)?,
                bind_port: parse_port(bind_port)?,
                connect_host: host_field(connect_host)?,
                connect_port: parse_port(connect_port)?,
            }),
            // bind_port:connect_host:connect_port
            [bind_port, connect_host, connect_port] if is_port(bind_port) => Ok(Self {
                bind_host: DEFAULT_BIND_HOST.to_string(),
                bind_port: parse_port(bind_port)?,
                connect_host: host_field(connect_host)?,
                connect_port: parse_port(connect_port)?,
            }),
            // bind_host:bind_port:connect_port
            [bind_host, bind_port, connect_port] if is_port(bind_port) => Ok(Self {
                bind_host: host_field(bind_host)?,
                bind_port: parse_port(bind_port)?,
                connect_host: DEFAULT_CONNECT_HOST.to_string(),
                connect_port: parse_port(connect_port)?,
            }),
            _ => Err(invalid(format!(
                "expected [bind_host:]bind_port:connect_host:connect_port, got: {s}"
            ))),
        }
    }

    /// `bind_host:bind_port`, bracketing IPv6 literals.
    pub fn bind_display(&self) -> String {
        join_host_port(&self.bind_host, self.bind_port)
    }

    /// `connect_host:connect_port`, bracketing IPv6 literals.
    pub fn connect_display(&self) -> String {
        join_host_port(&self.connect_host, self.connect_port)
    }
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.bind_display(), self.connect_display())
    }
}

/// A forward request from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    /// Direction.
    pub kind: ForwardKind,
    /// Addressing.
    pub spec: ForwardSpec,
}

impl Forward {
    /// Parse a local forward specification (-L).
    pub fn parse_local(s: &str) -> Result<Self> {
        Ok(Self {
            kind: ForwardKind::Local,
            spec: ForwardSpec::parse(s)?,
        })
    }

    /// Parse a remote forward specification (-R).
    pub fn parse_remote(s: &str) -> Result<Self> {
        Ok(Self {
            kind: ForwardKind::Remote,
            spec: ForwardSpec::parse(s)?,
        })
    }
}

/// Split on ':' outside of brackets.
fn split_fields(s: &str) -> Result<Vec<&str>> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid("unbalanced ']'"))?;
            }
            ':' if depth == 0 => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid("unclosed IPv6 bracket"));
    }
    fields.push(&s[start..]);
    Ok(fields)
}

/// Validate a host field, stripping IPv6 brackets.
fn host_field(s: &str) -> Result<String> {
    let host = match s.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| invalid(format!("invalid bracketed host: {s}")))?,
        None => s,
    };
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    Ok(host.to_string())
}

fn is_port(s: &str) -> bool {
    s.parse::<u16>().is_ok()
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|_| invalid(format!("invalid port: {s}")))
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidForwardSpec {
        message: message.into(),
    }
}
