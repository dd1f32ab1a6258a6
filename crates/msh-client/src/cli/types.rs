//! CLI types and struct definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use msh_core::constants::DEFAULT_SSH_PORT;
use msh_core::{Forward, SessionConfig};

use crate::ssh::SshConfig;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for msh_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => msh_core::LogFormat::Text,
            CliLogFormat::Json => msh_core::LogFormat::Json,
        }
    }
}

/// Interactive SSH shell with file transfer and port forwarding.
#[derive(Debug, Parser)]
#[command(
    name = "msh",
    version,
    about = "Interactive SSH shell with get/put file transfer and port forwarding"
)]
pub struct Cli {
    /// Remote target (user[:password]@host)
    pub destination: String,

    /// SSH port to connect to
    #[arg(short = 'p', long, default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Local port forward: [bind_host:]bind_port:connect_host:connect_port
    #[arg(short = 'L', long = "local", action = ArgAction::Append, value_name = "SPEC")]
    pub local_forward: Vec<String>,

    /// Remote port forward: [bind_host:]bind_port:connect_host:connect_port
    #[arg(short = 'R', long = "remote", action = ArgAction::Append, value_name = "SPEC")]
    pub remote_forward: Vec<String>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,

    /// Show the remote echo of typed lines
    #[arg(long = "show-echo")]
    pub show_echo: bool,

    /// Idle time that ends a query reply, in milliseconds
    #[arg(long = "batch-timeout-ms", value_name = "MS", default_value_t = 300)]
    pub batch_timeout_ms: u64,

    /// Give up matching echo after this long without progress (0 waits forever)
    #[arg(long = "echo-stall-ms", value_name = "MS", default_value_t = 2000)]
    pub echo_stall_ms: u64,

    /// Connection and authentication timeout in seconds
    #[arg(long = "connect-timeout", value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,
}

impl Cli {
    /// Stream settings for the shell session.
    pub fn session_config(&self) -> SessionConfig {
        let stall = match self.echo_stall_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        SessionConfig::new()
            .with_suppress_echo(!self.show_echo)
            .with_batch_idle_timeout(Duration::from_millis(self.batch_timeout_ms))
            .with_echo_stall_timeout(stall)
    }

    /// SSH transport settings.
    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ..SshConfig::default()
        }
    }

    /// Parse every `-L` and `-R` argument, local forwards first.
    pub fn forwards(&self) -> msh_core::Result<Vec<Forward>> {
        let local = self.local_forward.iter().map(|s| Forward::parse_local(s));
        let remote = self.remote_forward.iter().map(|s| Forward::parse_remote(s));
        local.chain(remote).collect()
    }
}
