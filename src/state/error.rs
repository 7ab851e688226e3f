//! Error types for the state store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting sync state.
///
/// Reading is fail-open and never produces these; only writes, resets and
/// lock acquisition do.
#[derive(Error, Debug)]
pub enum StateError {
    /// A filesystem operation on the state file or its siblings failed.
    #[error("State file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serializing the in-memory state failed.
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process holds the state lock.
    #[error("Another itslearning-dl instance is using this state file (lock: {0})")]
    Locked(PathBuf),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
