//! SSH transport.
//!
//! Thin adapter over russh:
//! 1. Connect and authenticate (password or agent)
//! 2. Open the interactive shell with a PTY
//! 3. Open SFTP sessions and direct-tcpip channels on demand
//! 4. Request remote forwards and route forwarded-tcpip channels to them

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::{self, Handle, Msg};
use russh::keys::agent::client::AgentClient;
use russh::keys::ssh_key;
use russh::{Channel, ChannelMsg, ChannelStream, ChannelWriteHalf, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use msh_core::constants::{
    CONNECT_TIMEOUT, DEFAULT_TERM, FORWARDED_CHANNEL_QUEUE, KEEPALIVE_INTERVAL, SHELL_CHUNK_QUEUE,
};
use msh_core::{Auth, ConnectInfo, Error, ForwardSpec, Result};

use crate::forward::ForwardOpener;
use crate::lifecycle::Disconnector;
use crate::terminal::TermSize;

/// SSH client configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Time allowed for TCP connect plus handshake and authentication.
    pub connect_timeout: Duration,
    /// Keepalive interval.
    pub keepalive_interval: Duration,
    /// Terminal type requested for the PTY.
    pub term: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            term: DEFAULT_TERM.to_string(),
        }
    }
}

/// Forwarded-tcpip channels waiting to be relayed, keyed by bound port.
type ForwardRoutes = Arc<Mutex<HashMap<u32, mpsc::Sender<ChannelStream<Msg>>>>>;

/// SSH client handler.
pub struct ClientHandler {
    routes: ForwardRoutes,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // No known_hosts store; the key is logged so it can be checked by hand.
        debug!(
            algorithm = %server_public_key.algorithm(),
            fingerprint = %server_public_key.fingerprint(Default::default()),
            "Accepting server host key"
        );
        Ok(true)
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        debug!(
            bind = %format!("{connected_address}:{connected_port}"),
            originator = %format!("{originator_address}:{originator_port}"),
            "Forwarded connection"
        );

        let route = self
            .routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(&connected_port).cloned());

        match route {
            Some(tx) => {
                if tx.send(channel.into_stream()).await.is_err() {
                    warn!(port = connected_port, "Remote forward relay stopped, dropping channel");
                }
            }
            None => {
                warn!(port = connected_port, "No remote forward for port, dropping channel");
            }
        }
        Ok(())
    }
}

/// An authenticated SSH connection.
pub struct SshConnection {
    handle: Handle<ClientHandler>,
    routes: ForwardRoutes,
    host: String,
}

/// The interactive shell: an output stream and a writer.
pub struct ShellChannel {
    /// Shell output chunks. Ends when the remote closes the channel.
    pub output: mpsc::Receiver<Bytes>,
    /// Keystrokes to the shell.
    pub writer: ShellWriter,
}

impl SshConnection {
    /// Connect and authenticate.
    pub async fn connect(info: &ConnectInfo, config: &SshConfig) -> Result<Self> {
        let addr = info.address();
        info!(addr = %addr, user = %info.username, "Connecting via SSH");

        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(config.keepalive_interval),
            keepalive_max: 3,
            ..Default::default()
        });
        let routes: ForwardRoutes = Arc::new(Mutex::new(HashMap::new()));
        let handler = ClientHandler {
            routes: routes.clone(),
        };

        let connect = async {
            let mut handle = client::connect(ssh_config, addr.as_str(), handler)
                .await
                .map_err(|e| Error::Connect {
                    host: addr.clone(),
                    message: e.to_string(),
                })?;
            debug!("SSH connection established");
            authenticate(&mut handle, info).await?;
            Ok::<_, Error>(handle)
        };

        let handle = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| Error::Timeout)??;

        info!(host = %info.host, "SSH authentication successful");

        Ok(Self {
            handle,
            routes,
            host: info.host.clone(),
        })
    }

    /// Open the interactive shell with a PTY of the given size.
    pub async fn open_shell(&self, term: &str, size: TermSize) -> Result<ShellChannel> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| transport("failed to open session channel", e))?;

        channel
            .request_pty(true, term, size.cols.into(), size.rows.into(), 0, 0, &[])
            .await
            .map_err(|e| transport("failed to request PTY", e))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| transport("failed to request shell", e))?;

        debug!(cols = size.cols, rows = size.rows, "Shell opened");

        let (mut read_half, write_half) = channel.split();
        let (tx, output) = mpsc::channel(SHELL_CHUNK_QUEUE);

        tokio::spawn(async move {
            while let Some(msg) = read_half.wait().await {
                match msg {
                    ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                        if tx.send(Bytes::copy_from_slice(&data)).await.is_err() {
                            break;
                        }
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        debug!(exit_status, "Remote shell exited");
                    }
                    ChannelMsg::Eof | ChannelMsg::Close => break,
                    _ => {}
                }
            }
            debug!("Shell reader finished");
        });

        let writer = ShellWriter {
            inner: Box::pin(write_half.make_writer()),
            _half: write_half,
        };

        Ok(ShellChannel { output, writer })
    }

    /// Open an SFTP session on a new channel.
    pub async fn open_sftp(&self) -> Result<SftpSession> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| transport("failed to open SFTP channel", e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| transport("failed to request SFTP subsystem", e))?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::FileTransfer {
                message: format!("failed to initialize SFTP session: {e}"),
            })
    }

    /// Open a direct-tcpip channel to `host:port` on the remote side.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<ChannelStream<Msg>> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                host,
                port.into(),
                originator.ip().to_string(),
                originator.port().into(),
            )
            .await
            .map_err(|e| Error::Forward {
                message: format!("direct-tcpip to {host}:{port} failed: {e}"),
            })?;
        Ok(channel.into_stream())
    }

    /// Ask the server to listen on `spec`'s bind address.
    ///
    /// Returns the receiver of channels opened for that listener.
    pub async fn request_remote_forward(
        &mut self,
        spec: &ForwardSpec,
    ) -> Result<mpsc::Receiver<ChannelStream<Msg>>> {
        let (tx, rx) = mpsc::channel(FORWARDED_CHANNEL_QUEUE);
        let requested = u32::from(spec.bind_port);
        self.set_route(requested, Some(tx.clone()));

        let bound = match self
            .handle
            .tcpip_forward(spec.bind_host.as_str(), requested)
            .await
        {
            Ok(bound) => bound,
            Err(e) => {
                self.set_route(requested, None);
                return Err(Error::Forward {
                    message: format!("tcpip-forward on {} refused: {e}", spec.bind_display()),
                });
            }
        };

        // Port 0 asks the server to pick one.
        if requested == 0 && bound != 0 {
            self.set_route(requested, None);
            self.set_route(bound, Some(tx));
        }

        info!(
            bind = %spec.bind_display(),
            bound_port = if bound == 0 { requested } else { bound },
            dest = %spec.connect_display(),
            "Remote forward established"
        );
        Ok(rx)
    }

    fn set_route(&self, port: u32, tx: Option<mpsc::Sender<ChannelStream<Msg>>>) {
        if let Ok(mut routes) = self.routes.lock() {
            match tx {
                Some(tx) => routes.insert(port, tx),
                None => routes.remove(&port),
            };
        }
    }

    /// Close the SSH connection.
    pub async fn disconnect(&self) -> Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
            .map_err(|e| transport("failed to disconnect", e))?;
        info!(host = %self.host, "SSH connection closed");
        Ok(())
    }
}

#[async_trait]
impl ForwardOpener for SshConnection {
    type Stream = ChannelStream<Msg>;

    async fn open(&self, host: &str, port: u16, originator: SocketAddr) -> Result<Self::Stream> {
        self.open_direct_tcpip(host, port, originator).await
    }
}

#[async_trait]
impl Disconnector for SshConnection {
    async fn disconnect(&self) -> Result<()> {
        SshConnection::disconnect(self).await
    }
}

/// Writer half of the shell channel.
///
/// Holds the channel's write half so the channel stays open while
/// keystrokes are being sent.
pub struct ShellWriter {
    inner: Pin<Box<dyn AsyncWrite + Send>>,
    _half: ChannelWriteHalf<Msg>,
}

impl AsyncWrite for ShellWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

async fn authenticate(handle: &mut Handle<ClientHandler>, info: &ConnectInfo) -> Result<()> {
    let authenticated = match &info.auth {
        Auth::Password(password) => {
            debug!("Attempting password authentication");
            handle
                .authenticate_password(info.username.as_str(), password.as_str())
                .await
                .map_err(|e| transport("password authentication failed", e))?
                .success()
        }
        Auth::Agent(socket) => agent_auth(handle, &info.username, socket).await?,
        Auth::None => {
            debug!("No credentials, trying none authentication");
            handle
                .authenticate_none(info.username.as_str())
                .await
                .map_err(|e| transport("authentication failed", e))?
                .success()
        }
    };

    if !authenticated {
        return Err(Error::AuthenticationFailed);
    }
    Ok(())
}

/// Try each agent identity in turn.
async fn agent_auth(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    socket: &Path,
) -> Result<bool> {
    debug!(socket = %socket.display(), "Attempting SSH agent authentication");

    let mut agent = AgentClient::connect_uds(socket)
        .await
        .map_err(|e| transport("SSH agent connection failed", e))?;
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| transport("failed to list agent identities", e))?;

    if identities.is_empty() {
        warn!("SSH agent has no identities");
        return Ok(false);
    }

    for key in identities {
        let hash_alg = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
        match handle
            .authenticate_publickey_with(username, key, hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => debug!("Agent key rejected"),
            Err(e) => debug!(error = %e, "Agent signing failed"),
        }
    }
    Ok(false)
}

fn transport(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Transport {
        message: format!("{context}: {e}"),
    }
}

// =============================================================================
// Tests
// =============================================================================
