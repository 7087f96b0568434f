//! Error types for the outer surfaces (config loading, server bind).
//!
//! The simulation step itself never fails: degenerate state is a no-op.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum SimError {
    /// Reading a file failed.
    Io { path: PathBuf, source: std::io::Error },
    /// JSON did not parse or did not match the expected shape.
    Parse(serde_json::Error),
    /// A configuration value is out of its valid range.
    InvalidConfig { field: &'static str, detail: String },
    /// The server could not listen on its address.
    Bind { addr: String, source: std::io::Error },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse(err) => write!(f, "invalid json: {err}"),
            Self::InvalidConfig { field, detail } => write!(f, "invalid config `{field}`: {detail}"),
            Self::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } | Self::Bind { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidConfig { .. } => None,
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// Result type for fallible setup operations.
pub type SimResult<T> = Result<T, SimError>;
