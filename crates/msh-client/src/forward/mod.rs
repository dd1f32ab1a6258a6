//! Port forwarding relays.
//!
//! - Local forward (-L): listen locally, open a direct-tcpip channel per
//!   connection, relay bytes both ways.
//! - Remote forward (-R): the server listens; each forwarded-tcpip channel
//!   it opens is relayed to a local TCP connection.
//!
//! A failed connection is closed on its own; the listener keeps running.

mod local;
mod remote;


use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use msh_core::Result;

pub use local::LocalForwarder;
pub use remote::RemoteForwarder;

/// Opens the remote end of a local forward.
#[async_trait]
pub trait ForwardOpener: Send + Sync + 'static {
    /// Byte stream to the forward target.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `host:port` on behalf of the local peer `originator`.
    async fn open(&self, host: &str, port: u16, originator: SocketAddr) -> Result<Self::Stream>;
}
