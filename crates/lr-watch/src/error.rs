//! Watch error types.

use std::path::PathBuf;

/// Error starting a [`Watcher`](crate::Watcher).
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Root directory does not exist or is not a directory.
    #[error("Watch root not found: {}", .0.display())]
    RootNotFound(PathBuf),
    /// I/O error while resolving the root.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Neither the native nor the polling backend could watch the root.
    #[error("Failed to initialize file watcher: {0}")]
    Init(#[from] notify::Error),
}
