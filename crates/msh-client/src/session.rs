//! Interactive shell session.
//!
//! A single task owns the shell channel. It multiplexes three sources:
//! - output chunks from the remote shell
//! - commands from [`SessionHandle`]s (send a line, run a query)
//! - the demultiplexer's next deadline (batch idle timeout, echo stall)
//!
//! Every chunk is fully classified before the next one is read, and a
//! deadline can never fire in the middle of a chunk.

use std::io::Write;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use msh_core::constants::{CTRL_C, CTRL_D, LINE_KILL, PWD_COMMAND, SESSION_COMMAND_QUEUE, TAB};
use msh_core::stream::{Demultiplexer, RemoteDir, ReplyEvent, StreamState};
use msh_core::{Error, Result, SessionConfig};

type Responder = oneshot::Sender<Result<String>>;

/// Requests accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send `line` plus a newline, hiding its echo.
    SendLine(String),
    /// Send `line` plus a newline and collect the reply until idle.
    Batch { line: String, reply: Responder },
    /// Send `partial` and a tab, and return what the shell completes.
    Complete { partial: String, reply: Responder },
    /// Write bytes to the shell without echo tracking.
    Raw(Vec<u8>),
    /// Write bytes to the local terminal.
    Display(Vec<u8>),
}

/// Cloneable handle for talking to a running [`ShellSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Send a line to the remote shell.
    pub async fn send_line(&self, line: &str) -> Result<()> {
        self.send(SessionCommand::SendLine(line.to_string())).await
    }

    /// Run `line` on the remote shell and return its output.
    ///
    /// The output is considered complete once the shell has been quiet for
    /// the batch idle timeout. Fails with [`Error::RequestPending`] if
    /// another query is in flight.
    pub async fn batch_request(&self, line: &str) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Batch {
            line: line.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Ask the remote shell for its working directory and prompt.
    pub async fn current_dir(&self) -> Result<RemoteDir> {
        let reply = self.batch_request(PWD_COMMAND).await?;
        RemoteDir::parse(&reply)
    }

    /// Ask the remote shell to tab-complete `partial`.
    pub async fn request_completion(&self, partial: &str) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Complete {
            partial: partial.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Blocking variant of [`SessionHandle::request_completion`] for the
    /// line editor thread. Must not be called from async context.
    pub fn blocking_request_completion(&self, partial: &str) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(SessionCommand::Complete {
                partial: partial.to_string(),
                reply,
            })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.blocking_recv().map_err(|_| Error::ConnectionClosed)?
    }

    /// Forward Ctrl+C to the remote shell.
    pub async fn interrupt(&self) -> Result<()> {
        self.send(SessionCommand::Raw(vec![CTRL_C])).await
    }

    /// Forward Ctrl+D to the remote shell.
    pub async fn send_eof(&self) -> Result<()> {
        self.send(SessionCommand::Raw(vec![CTRL_D])).await
    }

    /// Write to the local terminal, ordered with shell output.
    pub async fn display(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.send(SessionCommand::Display(bytes.into())).await
    }

    /// True once the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// The session task state.
pub struct ShellSession<W> {
    demux: Demultiplexer,
    output: mpsc::Receiver<Bytes>,
    commands: mpsc::Receiver<SessionCommand>,
    writer: W,
    terminal: Box<dyn Write + Send>,
    responder: Option<Responder>,
}

impl<W> ShellSession<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a session reading shell output from `output` and writing
    /// keystrokes to `writer`. The shell is considered closed when
    /// `output` ends.
    pub fn new(
        config: SessionConfig,
        output: mpsc::Receiver<Bytes>,
        writer: W,
        terminal: Box<dyn Write + Send>,
    ) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::channel(SESSION_COMMAND_QUEUE);
        let session = Self {
            demux: Demultiplexer::new(config),
            output,
            commands,
            writer,
            terminal,
            responder: None,
        };
        (session, SessionHandle { tx })
    }

    pub fn state(&self) -> StreamState {
        self.demux.state()
    }

    /// Run until the shell channel closes.
    ///
    /// A query still in flight at that point fails with
    /// [`Error::ConnectionClosed`].
    pub async fn run(mut self) {
        let mut commands_open = true;

        loop {
            let deadline = self.demux.next_deadline();

            tokio::select! {
                biased;

                chunk = self.output.recv() => match chunk {
                    Some(chunk) => self.on_chunk(&chunk).await,
                    None => {
                        info!("Shell channel closed");
                        break;
                    }
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        debug!("All session handles dropped");
                        commands_open = false;
                    }
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(event) = self.demux.poll(Instant::now()) {
                        self.complete(event).await;
                    }
                }
            }
        }

        self.demux.cancel_pending();
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(Err(Error::ConnectionClosed));
        }
    }

    async fn on_chunk(&mut self, chunk: &[u8]) {
        trace!(len = chunk.len(), state = ?self.demux.state(), "Shell output");
        let dispatch = self.demux.dispatch(chunk, Instant::now());
        self.show(&dispatch.display);
        if let Some(event) = dispatch.event {
            self.complete(event).await;
        }
    }

    async fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SendLine(line) => {
                let bytes = format!("{line}\n");
                if let Err(e) = self.write_echoed(bytes.as_bytes()).await {
                    warn!(error = %e, "Failed to send line");
                }
            }
            SessionCommand::Batch { line, reply } => self.start_batch(line, reply).await,
            SessionCommand::Complete { partial, reply } => {
                self.start_completion(partial, reply).await
            }
            SessionCommand::Raw(bytes) => {
                if let Err(e) = self.write_raw(&bytes).await {
                    warn!(error = %e, "Failed to write to shell");
                }
            }
            SessionCommand::Display(bytes) => self.show(&bytes),
        }
    }

    async fn start_batch(&mut self, line: String, reply: Responder) {
        if let Err(e) = self.demux.install_batch(Instant::now()) {
            let _ = reply.send(Err(e));
            return;
        }

        let bytes = format!("{line}\n");
        if let Err(e) = self.write_echoed(bytes.as_bytes()).await {
            self.demux.cancel_pending();
            let _ = reply.send(Err(e));
            return;
        }

        debug!(line = %line, "Batch request sent");
        self.responder = Some(reply);
    }

    async fn start_completion(&mut self, partial: String, reply: Responder) {
        if let Err(e) = self.demux.install_autocomplete(Instant::now()) {
            let _ = reply.send(Err(e));
            return;
        }

        if let Err(e) = self.send_partial(&partial).await {
            self.demux.cancel_pending();
            let _ = reply.send(Err(e));
            return;
        }

        debug!(partial = %partial, "Completion request sent");
        self.responder = Some(reply);
    }

    async fn send_partial(&mut self, partial: &str) -> Result<()> {
        self.write_echoed(partial.as_bytes()).await?;
        self.write_raw(&[TAB]).await
    }

    async fn complete(&mut self, event: ReplyEvent) {
        let reply = match event {
            ReplyEvent::Batch(reply) => reply,
            ReplyEvent::Completion(reply) => {
                // Erase the partial command on the remote line. The echo of
                // the erase is discarded by the demultiplexer.
                if let Err(e) = self.write_raw(&[LINE_KILL]).await {
                    warn!(error = %e, "Failed to clear remote line");
                }
                reply
            }
        };

        match self.responder.take() {
            Some(responder) => {
                let _ = responder.send(Ok(reply));
            }
            None => warn!("Reply completed with no caller waiting"),
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let result = self
            .terminal
            .write_all(bytes)
            .and_then(|()| self.terminal.flush());
        if let Err(e) = result {
            warn!(error = %e, "Terminal write failed");
        }
    }

    async fn write_echoed(&mut self, bytes: &[u8]) -> Result<()> {
        self.demux.arm_echo(bytes, Instant::now());
        self.write_raw(bytes).await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
