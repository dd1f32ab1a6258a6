//! Fake remote shell for testing without an SSH server.
//!
//! The session reads shell output as a stream of chunks and writes
//! keystrokes to an `AsyncWrite`. `FakeShell` provides both ends: tests push
//! scripted output chunks and inspect what the session wrote.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::{Notify, mpsc};

/// A scripted remote shell.
#[derive(Debug)]
pub struct FakeShell {
    /// Output from the "remote" (goes to the session).
    output_tx: Option<mpsc::Sender<Bytes>>,
    output_rx: Option<mpsc::Receiver<Bytes>>,
    /// Bytes the session wrote to the "remote".
    written: Arc<Mutex<Vec<u8>>>,
    notify: Arc<Notify>,
}

impl FakeShell {
    /// Create a new fake shell.
    pub fn new() -> Self {
        let (output_tx, output_rx) = mpsc::channel(256);
        Self {
            output_tx: Some(output_tx),
            output_rx: Some(output_rx),
            written: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Take the chunk receiver to hand to the session.
    pub fn take_output_receiver(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.output_rx.take()
    }

    /// A writer recording what the session sends to the shell.
    pub fn writer(&self) -> FakeShellWriter {
        FakeShellWriter {
            written: self.written.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Emit one chunk of shell output.
    pub async fn send_output(&self, data: &[u8]) -> Result<(), ()> {
        match &self.output_tx {
            Some(tx) => tx.send(Bytes::copy_from_slice(data)).await.map_err(|_| ()),
            None => Err(()),
        }
    }

    /// Close the shell channel.
    pub fn close(&mut self) {
        self.output_tx = None;
    }

    /// Check if the shell is closed.
    pub fn is_closed(&self) -> bool {
        self.output_tx.is_none()
    }

    /// Everything the session has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// Drain what the session has written.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.written.lock().unwrap())
    }

    /// Wait until the session has written at least `len` bytes in total.
    pub async fn wait_for_written(&self, len: usize) -> Vec<u8> {
        loop {
            let notified = self.notify.notified();
            {
                let written = self.written.lock().unwrap();
                if written.len() >= len {
                    return written.clone();
                }
            }
            notified.await;
        }
    }
}

impl Default for FakeShell {
    fn default() -> Self {
        Self::new()
    }
}

/// `AsyncWrite` half of a [`FakeShell`].
#[derive(Debug, Clone)]
pub struct FakeShellWriter {
    written: Arc<Mutex<Vec<u8>>>,
    notify: Arc<Notify>,
}

impl AsyncWrite for FakeShellWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.lock().unwrap().extend_from_slice(buf);
        self.notify.notify_waiters();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn output_reaches_receiver() {
        let mut shell = FakeShell::new();
        let mut rx = shell.take_output_receiver().unwrap();
        shell.send_output(b"hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let mut shell = FakeShell::new();
        let mut rx = shell.take_output_receiver().unwrap();
        shell.close();
        assert!(shell.is_closed());
        assert!(rx.recv().await.is_none());
        assert!(shell.send_output(b"x").await.is_err());
    }

    #[tokio::test]
    async fn writer_records_input() {
        let shell = FakeShell::new();
        let mut writer = shell.writer();
        writer.write_all(b"ls\n").await.unwrap();
        assert_eq!(shell.wait_for_written(3).await, b"ls\n");
        assert_eq!(shell.take_written(), b"ls\n");
        assert!(shell.written().is_empty());
    }
}
