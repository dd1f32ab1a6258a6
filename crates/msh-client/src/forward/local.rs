//! Local port forwarding (-L).
//!
//! Flow:
//! 1. Bind the local listener
//! 2. Accept a local TCP connection
//! 3. Open a channel to the target through the SSH connection
//! 4. Relay bytes until either side closes

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use msh_core::{ForwardSpec, Result};

use super::ForwardOpener;

/// Local port forwarder.
pub struct LocalForwarder<O> {
    spec: ForwardSpec,
    listener: TcpListener,
    opener: Arc<O>,
}

impl<O: ForwardOpener> LocalForwarder<O> {
    /// Bind the listener for `spec`.
    pub async fn bind(spec: ForwardSpec, opener: Arc<O>) -> Result<Self> {
        let listener = TcpListener::bind((spec.bind_host.as_str(), spec.bind_port)).await?;

        info!(
            addr = %listener.local_addr()?,
            dest = %spec.connect_display(),
            "Local forwarder bound"
        );

        Ok(Self {
            spec,
            listener,
            opener,
        })
    }

    /// Get the local address the forwarder is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is aborted.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted local connection");
                    let opener = Arc::clone(&self.opener);
                    let host = self.spec.connect_host.clone();
                    let port = self.spec.connect_port;
                    tokio::spawn(async move {
                        relay(stream, peer, opener, host, port).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }
    }

    /// Run on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn relay<O: ForwardOpener>(
    mut local: TcpStream,
    peer: SocketAddr,
    opener: Arc<O>,
    host: String,
    port: u16,
) {
    let mut remote = match opener.open(&host, port, peer).await {
        Ok(remote) => remote,
        Err(e) => {
            // Dropping the socket closes only this connection.
            warn!(peer = %peer, error = %e, "Forward open failed");
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut local, &mut remote).await {
        Ok((sent, received)) => {
            debug!(peer = %peer, sent, received, "Forward connection closed");
        }
        Err(e) => {
            debug!(peer = %peer, error = %e, "Forward connection ended with error");
        }
    }
}
