//! Session configuration.

use std::time::Duration;

use crate::constants::{BATCH_IDLE_TIMEOUT, ECHO_STALL_TIMEOUT};

/// Per-session settings for the shell stream.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hide echo bytes that match what was just sent. The local line editor
    /// has already displayed them.
    pub suppress_echo: bool,
    /// Local prompt shown by the line reader.
    pub prompt: String,
    /// Idle gap that ends a batch reply.
    pub batch_idle_timeout: Duration,
    /// Force-release echo suppression after this long without progress.
    /// `None` keeps suppression active until the echo matches.
    pub echo_stall_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            suppress_echo: true,
            prompt: String::new(),
            batch_idle_timeout: BATCH_IDLE_TIMEOUT,
            echo_stall_timeout: Some(ECHO_STALL_TIMEOUT),
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether matched echo is hidden.
    pub fn with_suppress_echo(mut self, suppress: bool) -> Self {
        self.suppress_echo = suppress;
        self
    }

    /// Set the local prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the batch idle timeout.
    pub fn with_batch_idle_timeout(mut self, timeout: Duration) -> Self {
        self.batch_idle_timeout = timeout;
        self
    }

    /// Set the echo stall timeout.
    pub fn with_echo_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.echo_stall_timeout = timeout;
        self
    }
}
