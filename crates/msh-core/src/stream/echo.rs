//! Echo suppression.
//!
//! A PTY echoes every byte the client writes. The local line editor has
//! already shown those bytes, so the echo of the most recently sent line is
//! matched byte by byte and swallowed.

use std::time::Duration;

use tokio::time::Instant;

/// Result of scanning one chunk against the expected echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoScan {
    /// Bytes of the chunk that belonged to the suppression window.
    pub consumed: usize,
    /// The full expected echo has now been seen.
    pub drained: bool,
}

/// Expected echo plus a match cursor.
///
/// The cursor only moves on an exact byte match. Bytes that do not match
/// are consumed without moving it, so a remote that rewrites its echo can
/// stall the cursor; callers bound that with [`EchoSuppressor::stall_deadline`].
#[derive(Debug, Default)]
pub struct EchoSuppressor {
    expected: Vec<u8>,
    cursor: usize,
    last_progress: Option<Instant>,
}

impl EchoSuppressor {
    /// Create an idle suppressor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start expecting `bytes`, replacing any earlier sequence.
    ///
    /// Arming with an empty slice leaves the suppressor idle.
    pub fn arm(&mut self, bytes: &[u8], now: Instant) {
        self.expected.clear();
        self.expected.extend_from_slice(bytes);
        self.cursor = 0;
        self.last_progress = if bytes.is_empty() { None } else { Some(now) };
    }

    /// True while part of the expected echo is still outstanding.
    pub fn is_active(&self) -> bool {
        self.cursor < self.expected.len()
    }

    /// Bytes of the expected echo not yet seen.
    pub fn remaining(&self) -> &[u8] {
        &self.expected[self.cursor..]
    }

    /// Scan `chunk` until the echo is complete or the chunk runs out.
    pub fn scan(&mut self, chunk: &[u8], now: Instant) -> EchoScan {
        let mut consumed = 0;
        for &byte in chunk {
            if !self.is_active() {
                break;
            }
            consumed += 1;
            if byte == self.expected[self.cursor] {
                self.cursor += 1;
                self.last_progress = Some(now);
            }
        }

        let drained = !self.is_active();
        if drained {
            self.release();
        }
        EchoScan { consumed, drained }
    }

    /// Drop the remaining expected echo.
    pub fn release(&mut self) {
        self.expected.clear();
        self.cursor = 0;
        self.last_progress = None;
    }

    /// When suppression should be force-released if nothing else matches.
    pub fn stall_deadline(&self, timeout: Duration) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        self.last_progress.map(|t| t + timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_by_default() {
        let echo = EchoSuppressor::new();
        assert!(!echo.is_active());
        assert!(echo.remaining().is_empty());
    }

    #[test]
    fn full_match_in_one_chunk() {
        let now = Instant::now();
        let mut echo = EchoSuppressor::new();
        echo.arm(b"ls\n", now);

        let scan = echo.scan(b"ls\nfile.txt\n", now);
        assert_eq!(scan.consumed, 3);
        assert!(scan.drained);
        assert!(!echo.is_active());
    }

    #[test]
    fn match_across_chunks() {
        let now = Instant::now();
        let mut echo = EchoSuppressor::new();
        echo.arm(b"pwd\n", now);

        let scan = echo.scan(b"pw", now);
        assert_eq!(scan, EchoScan { consumed: 2, drained: false });
        assert_eq!(echo.remaining(), b"d\n");

        let scan = echo.scan(b"d\n/home\n", now);
        assert_eq!(scan, EchoScan { consumed: 2, drained: true });
    }

    #[test]
    fn mismatch_consumes_without_advancing() {
        let now = Instant::now();
        let mut echo = EchoSuppressor::new();
        echo.arm(b"ab", now);

        // 'x' is swallowed but the cursor stays on 'a'.
        let scan = echo.scan(b"xa", now);
        assert_eq!(scan, EchoScan { consumed: 2, drained: false });
        assert_eq!(echo.remaining(), b"b");
    }

    #[test]
    fn empty_arm_stays_idle() {
        let now = Instant::now();
        let mut echo = EchoSuppressor::new();
        echo.arm(b"", now);
        assert!(!echo.is_active());
        assert_eq!(echo.scan(b"out", now).consumed, 0);
    }

    #[test]
    fn rearm_replaces_sequence() {
        let now = Instant::now();
        let mut echo = EchoSuppressor::new();
        echo.arm(b"first", now);
        echo.scan(b"fi", now);
        echo.arm(b"second", now);
        assert_eq!(echo.remaining(), b"second");
    }

    #[test]
    fn stall_deadline_tracks_progress() {
        let start = Instant::now();
        let timeout = Duration::from_secs(2);
        let mut echo = EchoSuppressor::new();
        echo.arm(b"abc", start);
        assert_eq!(echo.stall_deadline(timeout), Some(start + timeout));

        let later = start + Duration::from_millis(500);
        echo.scan(b"a", later);
        assert_eq!(echo.stall_deadline(timeout), Some(later + timeout));

        // Mismatches do not count as progress.
        echo.scan(b"z", later + Duration::from_secs(1));
        assert_eq!(echo.stall_deadline(timeout), Some(later + timeout));

        echo.release();
        assert_eq!(echo.stall_deadline(timeout), None);
    }
}
