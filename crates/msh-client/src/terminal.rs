//! Local terminal helpers.
//!
//! Provides:
//! - Terminal size detection for the remote PTY request
//! - The stdout sink shell output is written to
//! - Restoring the terminal mode on exit

use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use tracing::{debug, warn};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Get the current terminal size, 80x24 when stdout is not a terminal.
pub fn get_terminal_size() -> TermSize {
    let fd = io::stdout().as_raw_fd();

    let mut winsize = std::mem::MaybeUninit::<libc::winsize>::uninit();
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, winsize.as_mut_ptr()) };

    if result != 0 {
        return TermSize::default();
    }

    let winsize = unsafe { winsize.assume_init() };
    if winsize.ws_col == 0 || winsize.ws_row == 0 {
        return TermSize::default();
    }

    TermSize {
        cols: winsize.ws_col,
        rows: winsize.ws_row,
    }
}

/// Restores the terminal attributes saved at creation when dropped.
///
/// The line editor thread may still be inside a raw-mode read when the
/// process exits, so its own restore never runs.
pub struct TerminalModeGuard {
    fd: RawFd,
    original: Option<libc::termios>,
}

impl TerminalModeGuard {
    /// Save the current attributes of stdin. Does nothing when stdin is
    /// not a terminal.
    pub fn save() -> Self {
        let fd = io::stdin().as_raw_fd();
        let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
        let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
        let original = (result == 0).then(|| unsafe { termios.assume_init() });
        Self { fd, original }
    }

    pub fn is_terminal(&self) -> bool {
        self.original.is_some()
    }
}

impl Drop for TerminalModeGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original {
            let result = unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &original) };
            if result != 0 {
                warn!("Failed to restore terminal settings");
            } else {
                debug!("Restored terminal settings");
            }
        }
    }
}

/// Sink for remote shell output.
pub fn stdout_sink() -> Box<dyn Write + Send> {
    Box::new(StdoutSink(io::stdout()))
}

/// Flushes after every write so partial lines (prompts) show up at once.
struct StdoutSink(io::Stdout);

impl Write for StdoutSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self.0.lock();
        out.write_all(buf)?;
        out.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_size_is_never_zero() {
        // Works with or without a tty.
        let size = get_terminal_size();
        assert!(size.cols > 0);
        assert!(size.rows > 0);
    }

    #[test]
    fn default_size() {
        assert_eq!(TermSize::default(), TermSize { cols: 80, rows: 24 });
    }

    #[test]
    fn mode_guard_without_tty() {
        // Saving and restoring is harmless whether or not stdin is a tty.
        let guard = TerminalModeGuard::save();
        let _ = guard.is_terminal();
        drop(guard);
    }
}
