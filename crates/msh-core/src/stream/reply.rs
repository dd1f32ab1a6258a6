//! Decoding of query replies.

use crate::{Error, Result};

/// Remote working directory and prompt, taken from a `pwd` reply.
///
/// A shell answers `pwd` with the directory, a newline, and then redraws
/// its prompt, so both arrive in the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDir {
    pub cwd: String,
    pub prompt: String,
}

impl RemoteDir {
    pub fn parse(reply: &str) -> Result<Self> {
        let mut lines = reply.trim().lines().map(str::trim);

        let cwd = match lines.next() {
            Some(cwd) if !cwd.is_empty() => cwd.to_string(),
            _ => {
                return Err(Error::UnexpectedReply {
                    message: "empty reply to pwd".into(),
                });
            }
        };
        let prompt = lines.next().unwrap_or_default().to_string();

        Ok(Self { cwd, prompt })
    }
}
