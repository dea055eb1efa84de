//! CLI error types.

use std::fmt;
use std::path::PathBuf;

use sitewatch_alerts::AlertError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// An input file could not be parsed.
    Input {
        /// The offending file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },
    /// Invalid configuration.
    Config(String),
    /// Command execution failed.
    Command(String),
    /// Output formatting error.
    Format(String),
    /// The alerting library rejected the request.
    Alert(AlertError),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input { path, reason } => {
                write!(f, "invalid input {}: {reason}", path.display())
            }
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Command(msg) => write!(f, "command error: {msg}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Alert(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Alert(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<AlertError> for CliError {
    fn from(err: AlertError) -> Self {
        Self::Alert(err)
    }
}
