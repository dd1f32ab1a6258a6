//! Demultiplexer tests.

use std::time::Duration;

use tokio::time::Instant;

use super::*;
use crate::Error;
use crate::config::SessionConfig;

fn demux() -> Demultiplexer {
    Demultiplexer::new(SessionConfig::default())
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// =============================================================================
// Pass-through and echo
// =============================================================================

#[test]
fn idle_output_goes_to_display() {
    let mut d = demux();
    let out = d.dispatch(b"hello\r\n", Instant::now());
    assert_eq!(out.display, b"hello\r\n");
    assert_eq!(out.event, None);
    assert_eq!(d.state(), StreamState::Idle);
}

#[test]
fn echo_is_hidden_and_tail_displayed() {
    let now = Instant::now();
    let mut d = demux();
    d.arm_echo(b"ls\n", now);
    assert_eq!(d.state(), StreamState::EchoSuppressing);

    let out = d.dispatch(b"ls\na.txt\n", now);
    assert_eq!(out.display, b"a.txt\n");
    assert_eq!(d.state(), StreamState::Idle);
}

#[test]
fn echo_split_across_chunks() {
    let now = Instant::now();
    let mut d = demux();
    d.arm_echo(b"BO", now);

    // The consumer never sees a duplicate of B.
    let out = d.dispatch(b"B", now);
    assert!(out.display.is_empty());
    let out = d.dispatch(b"O", now);
    assert!(out.display.is_empty());
    let out = d.dispatch(b"O", now);
    assert_eq!(out.display, b"O");
}

#[test]
fn show_echo_mirrors_matched_bytes() {
    let now = Instant::now();
    let mut d = Demultiplexer::new(SessionConfig::new().with_suppress_echo(false));
    d.arm_echo(b"ls\n", now);
    let out = d.dispatch(b"ls\nout", now);
    assert_eq!(out.display, b"ls\nout");
}

#[test]
fn echo_stall_releases_suppression() {
    let start = Instant::now();
    let mut d = demux();
    d.arm_echo(b"abc", start);
    d.dispatch(b"zz", start);
    assert_eq!(d.state(), StreamState::EchoSuppressing);

    let stall = d.next_deadline().unwrap();
    assert_eq!(stall, start + Duration::from_secs(2));
    assert_eq!(d.poll(stall), None);
    assert_eq!(d.state(), StreamState::Idle);

    let out = d.dispatch(b"later", stall);
    assert_eq!(out.display, b"later");
}

#[test]
fn no_stall_release_when_disabled() {
    let start = Instant::now();
    let mut d = Demultiplexer::new(SessionConfig::new().with_echo_stall_timeout(None));
    d.arm_echo(b"abc", start);
    assert_eq!(d.next_deadline(), None);
    d.poll(start + Duration::from_secs(60));
    assert_eq!(d.state(), StreamState::EchoSuppressing);
}

// =============================================================================
// Batch
// =============================================================================

#[test]
fn batch_collects_until_idle() {
    let start = Instant::now();
    let mut d = demux();
    d.arm_echo(b"pwd\n", start);
    d.install_batch(start).unwrap();
    assert_eq!(d.state(), StreamState::AwaitingBatchReply);

    let out = d.dispatch(b"pwd\n/home/", start + ms(10));
    assert!(out.display.is_empty());
    assert_eq!(out.event, None);

    let out = d.dispatch(b"user\n$ ", start + ms(200));
    assert_eq!(out.event, None);

    // The deadline moved with the second chunk.
    assert_eq!(d.poll(start + ms(310)), None);
    assert_eq!(d.next_deadline(), Some(start + ms(500)));

    assert_eq!(
        d.poll(start + ms(500)),
        Some(ReplyEvent::Batch("/home/user\n$ ".into()))
    );
    assert_eq!(d.state(), StreamState::Idle);
    assert_eq!(d.poll(start + ms(900)), None);
}

#[test]
fn echo_only_chunk_restarts_batch_deadline() {
    let start = Instant::now();
    let mut d = demux();
    d.arm_echo(b"pwd\n", start);
    d.install_batch(start).unwrap();
    d.dispatch(b"pwd\n", start + ms(250));
    assert_eq!(d.next_deadline(), Some(start + ms(550)));
}

#[test]
fn batch_with_no_reply_completes_empty() {
    let start = Instant::now();
    let mut d = demux();
    d.install_batch(start).unwrap();
    assert_eq!(
        d.poll(start + ms(300)),
        Some(ReplyEvent::Batch(String::new()))
    );
}

#[test]
fn second_install_fails_fast() {
    let now = Instant::now();
    let mut d = demux();
    d.install_batch(now).unwrap();
    assert!(matches!(d.install_batch(now), Err(Error::RequestPending)));
    assert!(matches!(d.install_autocomplete(now), Err(Error::RequestPending)));

    d.cancel_pending();
    assert!(d.install_autocomplete(now).is_ok());
}

// =============================================================================
// Autocomplete
// =============================================================================

#[test]
fn autocomplete_completes_after_echo() {
    let now = Instant::now();
    let mut d = demux();
    d.arm_echo(b"cat fi", now);
    d.install_autocomplete(now).unwrap();

    let out = d.dispatch(b"cat fi", now);
    assert_eq!(out.event, None);
    assert_eq!(d.state(), StreamState::AwaitingAutocompleteReply);

    let out = d.dispatch(b"le.txt ", now);
    assert_eq!(out.event, Some(ReplyEvent::Completion("le.txt ".into())));
    assert!(out.display.is_empty());
    assert!(d.ignores_next_reply());

    // Echo of the line-kill is discarded once.
    let out = d.dispatch(b"\x08\x08\x08", now);
    assert!(out.display.is_empty());
    let out = d.dispatch(b"$ ", now);
    assert_eq!(out.display, b"$ ");
}

#[test]
fn autocomplete_echo_and_reply_in_one_chunk() {
    let now = Instant::now();
    let mut d = demux();
    d.arm_echo(b"ls /ho", now);
    d.install_autocomplete(now).unwrap();

    let out = d.dispatch(b"ls /home/", now);
    assert_eq!(out.event, Some(ReplyEvent::Completion("me/".into())));
}

#[test]
fn autocomplete_with_empty_partial() {
    let now = Instant::now();
    let mut d = demux();
    d.arm_echo(b"", now);
    d.install_autocomplete(now).unwrap();

    let out = d.dispatch(b"\x07", now);
    assert_eq!(out.event, Some(ReplyEvent::Completion("\x07".into())));
}

#[test]
fn autocomplete_after_stalled_echo() {
    let start = Instant::now();
    let mut d = demux();
    d.arm_echo(b"abc", start);
    d.install_autocomplete(start).unwrap();
    d.dispatch(b"xyz", start);

    d.poll(start + Duration::from_secs(2));
    let out = d.dispatch(b"reply", start + Duration::from_secs(2));
    assert_eq!(out.event, Some(ReplyEvent::Completion("reply".into())));
}

#[test]
fn autocomplete_gives_up_on_a_silent_shell() {
    let start = Instant::now();
    let mut d = demux();
    d.install_autocomplete(start).unwrap();
    d.arm_echo(b"cat zz", start);
    assert_eq!(d.next_deadline(), Some(start + Duration::from_secs(2)));

    // The echo arrives; the shell then offers nothing and stays quiet.
    d.dispatch(b"cat zz", start + ms(50));
    let deadline = start + ms(50) + Duration::from_secs(2);
    assert_eq!(d.next_deadline(), Some(deadline));
    assert_eq!(d.poll(deadline - ms(1)), None);

    assert_eq!(d.poll(deadline), Some(ReplyEvent::Completion(String::new())));
    assert_eq!(d.state(), StreamState::Idle);
    assert!(d.ignores_next_reply());
    assert_eq!(d.next_deadline(), None);
}

#[test]
fn autocomplete_waits_when_stall_timeout_disabled() {
    let now = Instant::now();
    let mut d = Demultiplexer::new(SessionConfig::new().with_echo_stall_timeout(None));
    d.install_autocomplete(now).unwrap();
    d.arm_echo(b"cat zz", now);
    d.dispatch(b"cat zz", now);

    assert_eq!(d.next_deadline(), None);
    assert_eq!(d.poll(now + Duration::from_secs(60)), None);
    assert_eq!(d.state(), StreamState::AwaitingAutocompleteReply);
}

#[test]
fn ignored_chunk_still_restarts_batch_deadline() {
    let now = Instant::now();
    let mut d = demux();
    d.arm_echo(b"a", now);
    d.install_autocomplete(now).unwrap();
    d.dispatch(b"ab", now);
    assert!(d.ignores_next_reply());

    d.install_batch(now).unwrap();
    let out = d.dispatch(b"kill-echo", now + ms(100));
    assert!(out.display.is_empty());
    assert_eq!(d.next_deadline(), Some(now + ms(400)));
}
