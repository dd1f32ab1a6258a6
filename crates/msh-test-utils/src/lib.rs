//! msh-test-utils: Test infrastructure for msh.
//!
//! Provides:
//! - FakeShell: Scripted remote shell stream for driving a session
//! - SharedBuffer: Captured terminal output

mod fake_shell;
mod shared_buffer;

pub use fake_shell::{FakeShell, FakeShellWriter};
pub use shared_buffer::SharedBuffer;
