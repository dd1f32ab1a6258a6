//! msh-core: shell stream handling and argument parsing for msh.
//!
//! This crate provides:
//! - The shell stream demultiplexer, echo suppression and reply correlation
//! - Forward specification and connection target parsing
//! - Session configuration and protocol constants
//! - Logging setup

pub mod config;
pub mod constants;
pub mod error;
pub mod forward;
pub mod logging;
pub mod stream;
pub mod target;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use forward::{Forward, ForwardKind, ForwardSpec, parse_forward};
pub use logging::{LogFormat, init_logging};
pub use target::{Auth, ConnectInfo, parse_connect};
