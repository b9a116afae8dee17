use std::path::PathBuf;

use thiserror::Error;

/// The five error kinds surfaced by the codec and engine layers.
///
/// Callers above this crate's typed core convert these into `anyhow::Error`
/// via `?` and attach path/operation context with `.context(...)`.
#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format error in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("consistency error: {reason}")]
    Consistency { reason: String },

    #[error("range error: {reason}")]
    Range { reason: String },

    #[error("parse error at {path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

impl DedupeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DedupeError::Io { path: path.into(), source }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DedupeError::Format { path: path.into(), reason: reason.into() }
    }

    pub fn consistency(reason: impl Into<String>) -> Self {
        DedupeError::Consistency { reason: reason.into() }
    }

    pub fn range(reason: impl Into<String>) -> Self {
        DedupeError::Range { reason: reason.into() }
    }

    pub fn parse(path: impl Into<PathBuf>, line: u64, reason: impl Into<String>) -> Self {
        DedupeError::Parse { path: path.into(), line, reason: reason.into() }
    }
}

pub type DedupeResult<T> = std::result::Result<T, DedupeError>;
