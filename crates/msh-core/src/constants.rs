//! Protocol and configuration constants for msh.

use std::time::Duration;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Bind host used when a forward spec omits one.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Connect host used when a forward spec gives only `bind_port:connect_port`.
pub const DEFAULT_CONNECT_HOST: &str = "127.0.0.1";

/// Environment variable naming the SSH agent socket.
pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

/// Terminal type requested for the remote PTY.
pub const DEFAULT_TERM: &str = "xterm";

/// SSH connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH keepalive interval.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Stream Constants
// =============================================================================

/// Idle gap that ends a batch reply.
pub const BATCH_IDLE_TIMEOUT: Duration = Duration::from_millis(300);

/// Time without echo progress after which suppression is force-released.
pub const ECHO_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Command issued to learn the remote working directory.
pub const PWD_COMMAND: &str = "pwd";

/// Interrupt (Ctrl+C).
pub const CTRL_C: u8 = 0x03;

/// End of transmission (Ctrl+D).
pub const CTRL_D: u8 = 0x04;

/// Readline line-kill (Ctrl+U).
pub const LINE_KILL: u8 = 0x15;

/// Tab, triggers completion on the remote shell.
pub const TAB: u8 = b'\t';

/// Terminal bell, emitted by shells when completion has no match.
pub const BELL: u8 = 0x07;

// =============================================================================
// Forwarding Constants
// =============================================================================

/// Capacity of the queue carrying forwarded-tcpip channels to a relay.
pub const FORWARDED_CHANNEL_QUEUE: usize = 16;

/// Capacity of the session command queue.
pub const SESSION_COMMAND_QUEUE: usize = 32;

/// Capacity of the inbound shell chunk queue.
pub const SHELL_CHUNK_QUEUE: usize = 256;
