//! Tracing setup.
//!
//! The client shares the terminal with the remote shell, so the default
//! level is `error` and anything chattier is opt-in via `-v` or `RUST_LOG`.
//! Logs can be diverted to a file to keep the terminal clean.

use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a `-v` count to a level name (0=error, 1=warn, 2=info, 3=debug, 4+=trace).
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the verbosity-derived filter.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = level_for_verbosity(verbosity);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "msh={level},msh_core={level},msh_client={level},russh=warn"
        ))
    });
    let detailed = verbosity >= 3;

    let result = match (log_file, format) {
        (None, LogFormat::Text) => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(detailed)
                    .with_line_number(detailed),
            )
            .try_init(),
        (None, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (Some(path), LogFormat::Text) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(detailed)
                        .with_line_number(detailed),
                )
                .try_init()
        }
        (Some(path), LogFormat::Json) => {
            let file = open_log_file(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(file))
                .try_init()
        }
    };

    result.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

/// Initialize logging with defaults for testing.
///
/// Silently ignores errors (logging may already be initialized).
pub fn init_test_logging() {
    let _ = init_logging(2, None, LogFormat::Text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn verbosity_mapping() {
        assert_eq!(level_for_verbosity(0), "error");
        assert_eq!(level_for_verbosity(1), "warn");
        assert_eq!(level_for_verbosity(2), "info");
        assert_eq!(level_for_verbosity(3), "debug");
        assert_eq!(level_for_verbosity(9), "trace");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_test_logging();
        init_test_logging();
    }
}
