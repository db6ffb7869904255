//! Error types for the watch engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from watch operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize watch backend: {reason}")]
    InitFailed { reason: String },

    #[error("cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("failed to stat {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },

    #[error("failed to read directory {path}: {source}")]
    Scan { path: PathBuf, source: io::Error },

    #[error("native watch failure on {path}: {source}")]
    Native { path: PathBuf, source: io::Error },

    #[error("invalid ignore pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("watcher channel closed unexpectedly")]
    ChannelClosed,
}

impl WatchError {
    /// Whether the underlying cause is a vanished path.
    ///
    /// Vanish transients are recovered into `unlink` events rather than
    /// surfaced on the error channel.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Stat { source, .. } | Self::Scan { source, .. } | Self::Native { source, .. } => {
                matches!(
                    source.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                )
            }
            _ => false,
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
