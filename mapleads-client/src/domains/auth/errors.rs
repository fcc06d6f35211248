//! Session error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while persisting or restoring the session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to read session file {path}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write session file {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupted session data: {0}")]
    CorruptedData(#[from] serde_json::Error),

    /// An operation that needs a session ran without one.
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl SessionError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }
}
