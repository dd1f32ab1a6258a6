//! In-memory terminal sink.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A cloneable `Write` that records everything written to it.
///
/// Hand one clone to the code under test as its terminal and keep another
/// to inspect what was displayed.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().unwrap().clone()
    }

    /// Contents as lossy UTF-8.
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_contents() {
        let buf = SharedBuffer::new();
        let mut writer = buf.clone();
        writer.write_all(b"hello").unwrap();
        assert_eq!(buf.contents(), b"hello");
        assert_eq!(buf.as_string(), "hello");
    }

    #[test]
    fn take_drains() {
        let buf = SharedBuffer::new();
        buf.clone().write_all(b"x").unwrap();
        assert_eq!(buf.take(), b"x");
        assert!(buf.is_empty());
    }
}
