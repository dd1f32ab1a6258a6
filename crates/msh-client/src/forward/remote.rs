//! Remote port forwarding (-R).
//!
//! The server listens on the bind address and opens a channel for every
//! connection it accepts. Each channel is relayed to a new TCP connection to
//! the local target.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use msh_core::ForwardSpec;

/// Remote port forwarder.
pub struct RemoteForwarder<S> {
    spec: ForwardSpec,
    incoming: mpsc::Receiver<S>,
}

impl<S> RemoteForwarder<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Relay channels from `incoming` to the connect address of `spec`.
    pub fn new(spec: ForwardSpec, incoming: mpsc::Receiver<S>) -> Self {
        Self { spec, incoming }
    }

    /// Relay until the channel source closes.
    pub async fn run(mut self) {
        while let Some(channel) = self.incoming.recv().await {
            let host = self.spec.connect_host.clone();
            let port = self.spec.connect_port;
            tokio::spawn(relay(channel, host, port));
        }
        info!(bind = %self.spec.bind_display(), "Remote forward stopped");
    }

    /// Run on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn relay<S>(mut channel: S, host: String, port: u16)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut local = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(e) => {
            // Dropping the channel rejects only this connection.
            warn!(addr = %format!("{host}:{port}"), error = %e, "Local connect failed");
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut channel, &mut local).await {
        Ok((to_local, to_remote)) => {
            debug!(to_local, to_remote, "Remote forward connection closed");
        }
        Err(e) => {
            debug!(error = %e, "Remote forward connection ended with error");
        }
    }
}
