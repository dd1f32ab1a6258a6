//! Shell stream demultiplexer.
//!
//! One interactive shell channel carries three kinds of traffic with no
//! framing between them: remote output for the terminal, replies to
//! client-issued queries, and the PTY's echo of what the client typed.
//! [`Demultiplexer::dispatch`] classifies each inbound chunk as it arrives.
//!
//! At most one query (the pending operation) owns the stream at a time:
//!
//! - Batch: collects everything until the stream has been quiet for the
//!   idle timeout.
//! - Autocomplete: completes on the first chunk that follows the drained
//!   echo of the partial command, or with whatever it has once the shell
//!   stays silent for the echo stall timeout after the echo drained.
//!
//! This type performs no I/O. Time is passed in so the session can drive
//! deadlines from its own clock.

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::echo::EchoSuppressor;
use crate::config::SessionConfig;
use crate::{Error, Result};

/// Coarse state of the stream, derived from the pending operation and echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Output goes straight to the terminal.
    Idle,
    /// Waiting for the echo of the last line, no query pending.
    EchoSuppressing,
    /// A batch query is collecting its reply.
    AwaitingBatchReply,
    /// An autocomplete query is waiting for its reply.
    AwaitingAutocompleteReply,
}

/// A completed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// Batch reply, complete after the idle timeout.
    Batch(String),
    /// Autocomplete reply.
    Completion(String),
}

/// What to do with one inbound chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Bytes for the local terminal.
    pub display: Vec<u8>,
    /// A query finished with this chunk.
    pub event: Option<ReplyEvent>,
}

#[derive(Debug)]
enum PendingOp {
    Batch { buf: BytesMut, deadline: Instant },
    Autocomplete {
        buf: BytesMut,
        deadline: Option<Instant>,
    },
}

/// Classifies shell output and correlates query replies.
#[derive(Debug)]
pub struct Demultiplexer {
    config: SessionConfig,
    echo: EchoSuppressor,
    pending: Option<PendingOp>,
    ignore_next_reply: bool,
    /// Echo drained with nothing left in its chunk; the next delivered
    /// chunk is the final one.
    final_pending: bool,
}

impl Demultiplexer {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            echo: EchoSuppressor::new(),
            pending: None,
            ignore_next_reply: false,
            final_pending: false,
        }
    }

    pub fn state(&self) -> StreamState {
        match &self.pending {
            Some(PendingOp::Batch { .. }) => StreamState::AwaitingBatchReply,
            Some(PendingOp::Autocomplete { .. }) => StreamState::AwaitingAutocompleteReply,
            None if self.echo.is_active() => StreamState::EchoSuppressing,
            None => StreamState::Idle,
        }
    }

    /// True when the next chunk will be discarded.
    pub fn ignores_next_reply(&self) -> bool {
        self.ignore_next_reply
    }

    /// Record bytes just written to the shell so their echo is hidden.
    ///
    /// Sending nothing means there is no echo to wait for, so the next
    /// delivered chunk already counts as final.
    pub fn arm_echo(&mut self, sent: &[u8], now: Instant) {
        self.echo.arm(sent, now);
        self.final_pending = false;
        if sent.is_empty() {
            self.await_final(now);
        } else if let Some(PendingOp::Autocomplete { deadline, .. }) = &mut self.pending {
            // The wait restarts once this echo drains.
            *deadline = None;
        }
    }

    /// Install a batch query. Its idle deadline starts now.
    pub fn install_batch(&mut self, now: Instant) -> Result<()> {
        self.ensure_free()?;
        self.pending = Some(PendingOp::Batch {
            buf: BytesMut::new(),
            deadline: now + self.config.batch_idle_timeout,
        });
        debug!("batch query installed");
        Ok(())
    }

    /// Install an autocomplete query.
    ///
    /// If the echo is already out of the way the wait for the reply starts
    /// at `now`.
    pub fn install_autocomplete(&mut self, now: Instant) -> Result<()> {
        self.ensure_free()?;
        self.pending = Some(PendingOp::Autocomplete {
            buf: BytesMut::new(),
            deadline: None,
        });
        if self.final_pending && !self.echo.is_active() {
            self.await_final(now);
        }
        debug!("autocomplete query installed");
        Ok(())
    }

    /// Drop the pending query without completing it.
    pub fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("pending query cancelled");
        }
    }

    /// The echo is out of the way; the next delivered chunk is final. An
    /// autocomplete query starts waiting for it from `now`.
    fn await_final(&mut self, now: Instant) {
        self.final_pending = true;
        if let Some(PendingOp::Autocomplete { deadline, .. }) = &mut self.pending {
            *deadline = self.config.echo_stall_timeout.map(|t| now + t);
        }
    }

    fn ensure_free(&self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::RequestPending);
        }
        Ok(())
    }

    /// Classify one inbound chunk.
    pub fn dispatch(&mut self, chunk: &[u8], now: Instant) -> Dispatch {
        let mut out = Dispatch::default();

        if let Some(PendingOp::Batch { deadline, .. }) = &mut self.pending {
            *deadline = now + self.config.batch_idle_timeout;
        }

        if self.ignore_next_reply {
            self.ignore_next_reply = false;
            trace!(len = chunk.len(), "discarding chunk");
            return out;
        }

        let mut rest = chunk;
        let mut is_final = self.final_pending;

        if self.echo.is_active() {
            let scan = self.echo.scan(chunk, now);
            if !self.config.suppress_echo {
                out.display.extend_from_slice(&chunk[..scan.consumed]);
            }
            rest = &chunk[scan.consumed..];
            is_final = scan.drained;
            if scan.drained {
                trace!("echo drained");
                if rest.is_empty() {
                    self.await_final(now);
                }
            }
        }

        if rest.is_empty() {
            return out;
        }
        self.final_pending = false;

        out.event = self.deliver(rest, is_final, &mut out.display);
        out
    }

    fn deliver(
        &mut self,
        bytes: &[u8],
        is_final: bool,
        display: &mut Vec<u8>,
    ) -> Option<ReplyEvent> {
        match &mut self.pending {
            None => {
                display.extend_from_slice(bytes);
                None
            }
            Some(PendingOp::Batch { buf, .. }) => {
                buf.extend_from_slice(bytes);
                None
            }
            Some(PendingOp::Autocomplete { buf, .. }) => {
                buf.extend_from_slice(bytes);
                if !is_final {
                    return None;
                }
                self.finish_autocomplete()
            }
        }
    }

    /// Complete the autocomplete query with what it has collected. The
    /// echo of the line kill that follows is discarded.
    fn finish_autocomplete(&mut self) -> Option<ReplyEvent> {
        let Some(PendingOp::Autocomplete { buf, .. }) = self.pending.take() else {
            return None;
        };
        let reply = String::from_utf8_lossy(&buf[..]).into_owned();
        self.ignore_next_reply = true;
        debug!(len = reply.len(), "autocomplete reply complete");
        Some(ReplyEvent::Completion(reply))
    }

    /// Earliest instant at which [`Demultiplexer::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let query = match &self.pending {
            Some(PendingOp::Batch { deadline, .. }) => Some(*deadline),
            Some(PendingOp::Autocomplete { deadline, .. }) => *deadline,
            None => None,
        };
        let stall = self
            .config
            .echo_stall_timeout
            .and_then(|t| self.echo.stall_deadline(t));

        match (query, stall) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Handle expired deadlines.
    ///
    /// A stalled echo is released and the next delivered chunk is treated
    /// as final. An expired batch deadline completes the batch query. An
    /// autocomplete query that heard nothing after its echo completes with
    /// what it has, usually nothing.
    pub fn poll(&mut self, now: Instant) -> Option<ReplyEvent> {
        if let Some(timeout) = self.config.echo_stall_timeout
            && let Some(stall) = self.echo.stall_deadline(timeout)
            && now >= stall
        {
            warn!(
                remaining = self.echo.remaining().len(),
                "echo did not match, releasing suppression"
            );
            self.echo.release();
            self.await_final(now);
        }

        let completion_expired = matches!(
            &self.pending,
            Some(PendingOp::Autocomplete { deadline: Some(deadline), .. }) if now >= *deadline
        );
        if completion_expired {
            debug!("no completion from the shell");
            return self.finish_autocomplete();
        }

        let expired = matches!(
            &self.pending,
            Some(PendingOp::Batch { deadline, .. }) if now >= *deadline
        );
        if expired && let Some(PendingOp::Batch { buf, .. }) = self.pending.take() {
            let reply = String::from_utf8_lossy(&buf).into_owned();
            debug!(len = reply.len(), "batch reply complete");
            return Some(ReplyEvent::Batch(reply));
        }

        None
    }
}
