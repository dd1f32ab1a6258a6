//! Line input.
//!
//! rustyline runs on its own thread and hands finished lines, Ctrl+C and
//! Ctrl+D to the async side over a channel. Tab completion is answered by
//! the remote shell through the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use msh_core::constants::BELL;
use msh_core::Result;

use crate::session::SessionHandle;

/// Something typed at the local terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Interrupt,
    Eof,
}

/// Turn a completion reply into a replacement for `partial`.
///
/// Only a single non-empty line is a usable completion. A bell means the
/// shell had nothing to offer; several lines are a candidate listing.
pub fn completion_candidate(partial: &str, reply: &str) -> Option<String> {
    let reply: String = reply.chars().filter(|&c| c != char::from(BELL)).collect();
    if reply.is_empty() || reply.contains(['\r', '\n']) {
        return None;
    }
    Some(format!("{partial}{reply}"))
}

/// rustyline helper asking the remote shell for completions.
pub struct RemoteCompleter {
    session: SessionHandle,
}

impl RemoteCompleter {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

impl Completer for RemoteCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let partial = &line[..pos];
        match self.session.blocking_request_completion(partial) {
            Ok(reply) => Ok((0, completion_candidate(partial, &reply).into_iter().collect())),
            Err(e) => {
                debug!(error = %e, "Completion unavailable");
                Ok((0, Vec::new()))
            }
        }
    }
}

impl Hinter for RemoteCompleter {
    type Hint = String;
}

impl Highlighter for RemoteCompleter {}

impl Validator for RemoteCompleter {}

impl Helper for RemoteCompleter {}

/// The line editor thread.
pub struct LineReader {
    thread: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl LineReader {
    /// Start reading lines with `prompt`.
    ///
    /// The editor is created on the reader thread. If that fails the event
    /// channel closes without sending anything.
    pub fn spawn(
        prompt: String,
        completer: RemoteCompleter,
        events: mpsc::Sender<InputEvent>,
    ) -> Result<Self> {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();

        let thread = std::thread::Builder::new()
            .name("msh-input".into())
            .spawn(move || match Editor::<RemoteCompleter, DefaultHistory>::new() {
                Ok(mut editor) => {
                    editor.set_helper(Some(completer));
                    read_loop(editor, &prompt, &events, &flag);
                }
                Err(e) => error!(error = %e, "Failed to create line editor"),
            })?;

        Ok(Self { thread, closed })
    }

    /// Handle that stops the reader after its current line.
    pub fn closer(&self) -> impl FnOnce() + Send + 'static {
        let closed = self.closed.clone();
        move || closed.store(true, Ordering::SeqCst)
    }

    /// True once the reader thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

fn read_loop(
    mut editor: Editor<RemoteCompleter, DefaultHistory>,
    prompt: &str,
    events: &mpsc::Sender<InputEvent>,
    closed: &AtomicBool,
) {
    while !closed.load(Ordering::SeqCst) {
        let event = match editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                InputEvent::Line(line)
            }
            Err(ReadlineError::Interrupted) => InputEvent::Interrupt,
            Err(ReadlineError::Eof) => InputEvent::Eof,
            Err(e) => {
                warn!(error = %e, "Line editor failed");
                break;
            }
        };

        if closed.load(Ordering::SeqCst) || events.blocking_send(event).is_err() {
            break;
        }
    }
    debug!("Line reader stopped");
}
