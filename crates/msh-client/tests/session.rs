//! Shell session tests against a scripted shell.
//!
//! Time is paused, so idle timeouts advance only when every task is waiting.

use std::time::Duration;

use tokio::task::JoinHandle;

use msh_client::{SessionHandle, ShellSession};
use msh_core::constants::{CTRL_C, CTRL_D, LINE_KILL};
use msh_core::{Error, SessionConfig};
use msh_test_utils::{FakeShell, SharedBuffer};

struct Harness {
    shell: FakeShell,
    terminal: SharedBuffer,
    handle: SessionHandle,
    task: JoinHandle<()>,
}

fn start(config: SessionConfig) -> Harness {
    let mut shell = FakeShell::new();
    let output = shell.take_output_receiver().unwrap();
    let terminal = SharedBuffer::new();
    let (session, handle) =
        ShellSession::new(config, output, shell.writer(), Box::new(terminal.clone()));
    let task = tokio::spawn(session.run());
    Harness {
        shell,
        terminal,
        handle,
        task,
    }
}

/// Let the session drain everything already queued.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// =============================================================================
// Pass-through lines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn idle_output_is_displayed() {
    let h = start(SessionConfig::new());

    h.shell.send_output(b"Welcome\r\nuser@host:~$ ").await.unwrap();
    settle().await;

    assert_eq!(h.terminal.as_string(), "Welcome\r\nuser@host:~$ ");
}

#[tokio::test(start_paused = true)]
async fn sent_line_echo_is_hidden() {
    let h = start(SessionConfig::new());

    h.handle.send_line("ls").await.unwrap();
    assert_eq!(h.shell.wait_for_written(3).await, b"ls\n");

    h.shell.send_output(b"l").await.unwrap();
    h.shell.send_output(b"s\r\nfile.txt\r\n$ ").await.unwrap();
    settle().await;

    assert_eq!(h.terminal.as_string(), "file.txt\r\n$ ");
}

#[tokio::test(start_paused = true)]
async fn show_echo_mirrors_the_echo() {
    let h = start(SessionConfig::new().with_suppress_echo(false));

    h.handle.send_line("ls").await.unwrap();
    h.shell.wait_for_written(3).await;
    h.shell.send_output(b"ls\r\nfile.txt\r\n$ ").await.unwrap();
    settle().await;

    assert_eq!(h.terminal.as_string(), "ls\r\nfile.txt\r\n$ ");
}

#[tokio::test(start_paused = true)]
async fn missing_echo_is_released_after_stall() {
    let h = start(SessionConfig::new());

    h.handle.send_line("secret").await.unwrap();
    h.shell.wait_for_written(7).await;

    // The remote never echoes. After the stall timeout output flows again.
    tokio::time::sleep(Duration::from_millis(2100)).await;
    h.shell.send_output(b"$ ").await.unwrap();
    settle().await;

    assert_eq!(h.terminal.as_string(), "$ ");
}

#[tokio::test(start_paused = true)]
async fn control_bytes_are_written_raw() {
    let h = start(SessionConfig::new());

    h.handle.interrupt().await.unwrap();
    h.handle.send_eof().await.unwrap();

    assert_eq!(h.shell.wait_for_written(2).await, vec![CTRL_C, CTRL_D]);
}

#[tokio::test(start_paused = true)]
async fn display_goes_to_terminal() {
    let h = start(SessionConfig::new());

    h.handle.display("user@host:~$ ").await.unwrap();
    settle().await;

    assert_eq!(h.terminal.as_string(), "user@host:~$ ");
    assert!(h.shell.written().is_empty());
}

// =============================================================================
// Batch replies
// =============================================================================

#[tokio::test(start_paused = true)]
async fn batch_reply_across_chunks_resolves_after_last_chunk() {
    let h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let request = tokio::spawn(async move { handle.batch_request("pwd").await });

    assert_eq!(h.shell.wait_for_written(4).await, b"pwd\n");

    h.shell.send_output(b"pwd\r\n/home/").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.shell.send_output(b"user\r\n$ ").await.unwrap();

    // 350ms after the first chunk, 250ms after the last one.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!request.is_finished());

    let reply = request.await.unwrap().unwrap();
    assert_eq!(reply, "/home/user\r\n$ ");
    assert!(h.terminal.is_empty());
}

#[tokio::test(start_paused = true)]
async fn current_dir_parses_reply() {
    let h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let request = tokio::spawn(async move { handle.current_dir().await });

    h.shell.wait_for_written(4).await;
    h.shell
        .send_output(b"pwd\r\n/home/user\r\nuser@host:~$ ")
        .await
        .unwrap();

    let dir = request.await.unwrap().unwrap();
    assert_eq!(dir.cwd, "/home/user");
    assert_eq!(dir.prompt, "user@host:~$");
}

#[tokio::test(start_paused = true)]
async fn second_request_fails_fast() {
    let h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let first = tokio::spawn(async move { handle.batch_request("pwd").await });
    h.shell.wait_for_written(4).await;

    let err = h.handle.batch_request("ls").await.unwrap_err();
    assert!(matches!(err, Error::RequestPending));
    let err = h.handle.request_completion("ca").await.unwrap_err();
    assert!(matches!(err, Error::RequestPending));
    assert_eq!(h.shell.written(), b"pwd\n");

    h.shell.send_output(b"pwd\r\n/tmp\r\n$ ").await.unwrap();
    assert_eq!(first.await.unwrap().unwrap(), "/tmp\r\n$ ");

    // The hook is free again.
    let handle = h.handle.clone();
    let next = tokio::spawn(async move { handle.batch_request("pwd").await });
    h.shell.wait_for_written(8).await;
    h.shell.send_output(b"pwd\r\n/srv\r\n$ ").await.unwrap();
    assert_eq!(next.await.unwrap().unwrap(), "/srv\r\n$ ");
}

#[tokio::test(start_paused = true)]
async fn shell_close_fails_pending_request() {
    let mut h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let request = tokio::spawn(async move { handle.batch_request("pwd").await });
    h.shell.wait_for_written(4).await;

    h.shell.close();

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    (&mut h.task).await.unwrap();
    assert!(h.handle.is_closed());
    assert!(matches!(
        h.handle.send_line("ls").await,
        Err(Error::ConnectionClosed)
    ));
}

// =============================================================================
// Autocomplete
// =============================================================================

#[tokio::test(start_paused = true)]
async fn completion_writes_tab_and_line_kill() {
    let h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let request = tokio::spawn(async move { handle.request_completion("cat fi").await });

    assert_eq!(h.shell.wait_for_written(7).await, b"cat fi\t");

    h.shell.send_output(b"cat fi").await.unwrap();
    h.shell.send_output(b"le.txt ").await.unwrap();
    assert_eq!(request.await.unwrap().unwrap(), "le.txt ");

    let written = h.shell.wait_for_written(8).await;
    assert_eq!(written[7..], [LINE_KILL]);

    // The echo of the line kill is dropped, later output is shown.
    h.shell.send_output(b"\x1b[2K\r$ ").await.unwrap();
    h.shell.send_output(b"hello").await.unwrap();
    settle().await;

    assert_eq!(h.terminal.as_string(), "hello");
}

#[tokio::test(start_paused = true)]
async fn completion_with_echo_and_reply_in_one_chunk() {
    let h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let request = tokio::spawn(async move { handle.request_completion("ls /ho").await });

    h.shell.wait_for_written(7).await;
    h.shell.send_output(b"ls /home/").await.unwrap();

    assert_eq!(request.await.unwrap().unwrap(), "me/");
}

#[tokio::test(start_paused = true)]
async fn completion_gives_up_when_shell_stays_silent() {
    let h = start(SessionConfig::new());
    let handle = h.handle.clone();
    let request = tokio::spawn(async move { handle.request_completion("cat zz").await });

    h.shell.wait_for_written(7).await;
    h.shell.send_output(b"cat zz").await.unwrap();

    // No bell, no candidates: the request ends empty after the stall timeout.
    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert!(!request.is_finished());
    assert_eq!(request.await.unwrap().unwrap(), "");

    let written = h.shell.wait_for_written(8).await;
    assert_eq!(written[7..], [LINE_KILL]);
}
