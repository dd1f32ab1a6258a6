//! Connection lifecycle.
//!
//! Tracks whether an interactive shell is up, decides what Ctrl+C means in
//! each state, and tears everything down once when the shell goes away.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use msh_core::Result;

/// Link state as seen by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Connecting, or the shell has closed.
    #[default]
    NotConnected,
    /// The interactive shell is running.
    ShellActive,
}

/// What to do with a Ctrl+C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Send 0x03 to the remote shell.
    Forward,
    /// Leave the program.
    Exit,
}

impl LinkState {
    pub fn on_interrupt(self) -> InterruptAction {
        match self {
            LinkState::ShellActive => InterruptAction::Forward,
            LinkState::NotConnected => InterruptAction::Exit,
        }
    }
}

/// Something that can close the SSH connection.
#[async_trait]
pub trait Disconnector: Send + Sync {
    async fn disconnect(&self) -> Result<()>;
}

/// Ordered, idempotent shutdown.
///
/// Order: disconnect the SSH connection, close the line reader, stop the
/// forwarding listeners.
#[derive(Default)]
pub struct Teardown {
    connection: Option<Arc<dyn Disconnector>>,
    close_reader: Option<Box<dyn FnOnce() + Send>>,
    listeners: Vec<JoinHandle<()>>,
    done: bool,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection(&mut self, connection: Arc<dyn Disconnector>) {
        self.connection = Some(connection);
    }

    pub fn set_reader_closer(&mut self, close: impl FnOnce() + Send + 'static) {
        self.close_reader = Some(Box::new(close));
    }

    pub fn add_listener(&mut self, listener: JoinHandle<()>) {
        self.listeners.push(listener);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Run the teardown. Later calls do nothing.
    pub async fn run(&mut self) {
        if self.done {
            debug!("Teardown already ran");
            return;
        }
        self.done = true;

        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.disconnect().await
        {
            warn!(error = %e, "Disconnect failed");
        }

        if let Some(close) = self.close_reader.take() {
            close();
        }

        for listener in self.listeners.drain(..) {
            listener.abort();
        }

        info!("Session torn down");
    }
}

/// Link state plus the teardown it guards.
#[derive(Default)]
pub struct Lifecycle {
    state: LinkState,
    teardown: Teardown,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn teardown_mut(&mut self) -> &mut Teardown {
        &mut self.teardown
    }

    /// The shell is up; Ctrl+C now goes to the remote.
    pub fn shell_started(&mut self) {
        self.state = LinkState::ShellActive;
    }

    pub fn on_interrupt(&self) -> InterruptAction {
        self.state.on_interrupt()
    }

    /// The shell is gone. Tears everything down once.
    pub async fn shell_closed(&mut self) {
        self.state = LinkState::NotConnected;
        self.teardown.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use msh_core::Error;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    struct FakeConnection {
        recorder: Arc<Recorder>,
        fail: bool,
    }

    #[async_trait]
    impl Disconnector for FakeConnection {
        async fn disconnect(&self) -> Result<()> {
            self.recorder.push("disconnect");
            if self.fail {
                return Err(Error::ConnectionClosed);
            }
            Ok(())
        }
    }

    fn teardown_with(recorder: &Arc<Recorder>, fail: bool) -> Teardown {
        let mut teardown = Teardown::new();
        teardown.set_connection(Arc::new(FakeConnection {
            recorder: recorder.clone(),
            fail,
        }));
        let r = recorder.clone();
        teardown.set_reader_closer(move || r.push("close reader"));
        teardown
    }

    #[test]
    fn interrupt_depends_on_state() {
        assert_eq!(LinkState::NotConnected.on_interrupt(), InterruptAction::Exit);
        assert_eq!(LinkState::ShellActive.on_interrupt(), InterruptAction::Forward);
    }

    #[tokio::test]
    async fn teardown_runs_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut teardown = teardown_with(&recorder, false);
        let listener = tokio::spawn(std::future::pending::<()>());
        teardown.add_listener(listener);

        teardown.run().await;
        assert_eq!(recorder.events(), vec!["disconnect", "close reader"]);
        assert!(teardown.is_done());
    }

    #[tokio::test]
    async fn teardown_twice_is_harmless() {
        let recorder = Arc::new(Recorder::default());
        let mut teardown = teardown_with(&recorder, false);

        teardown.run().await;
        teardown.run().await;
        assert_eq!(recorder.events(), vec!["disconnect", "close reader"]);
    }

    #[tokio::test]
    async fn teardown_continues_after_disconnect_error() {
        let recorder = Arc::new(Recorder::default());
        let mut teardown = teardown_with(&recorder, true);

        teardown.run().await;
        assert_eq!(recorder.events(), vec!["disconnect", "close reader"]);
    }

    #[tokio::test]
    async fn teardown_aborts_listeners() {
        let mut teardown = Teardown::new();
        let listener = tokio::spawn(std::future::pending::<()>());
        let abort = listener.abort_handle();
        teardown.add_listener(listener);

        teardown.run().await;
        for _ in 0..10 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.on_interrupt(), InterruptAction::Exit);

        lifecycle.shell_started();
        assert_eq!(lifecycle.state(), LinkState::ShellActive);
        assert_eq!(lifecycle.on_interrupt(), InterruptAction::Forward);

        lifecycle.shell_closed().await;
        lifecycle.shell_closed().await;
        assert_eq!(lifecycle.state(), LinkState::NotConnected);
        assert!(lifecycle.teardown_mut().is_done());
    }
}
