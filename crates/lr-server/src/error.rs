//! Error types for the servers.

use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lr_watch::WatchError;

/// Server startup and shutdown error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Root directory is missing or not a directory.
    #[error("Root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// A listener could not bind its address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address as configured.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// File watching could not be initialized.
    #[error("{0}")]
    Watch(#[from] WatchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Error serving a single asset request.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// No file at the requested path.
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Request path escapes the root directory or cannot be decoded.
    #[error("Invalid asset path: {0}")]
    InvalidPath(String),

    /// I/O error while reading an existing file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        match &self {
            Self::NotFound(path) => {
                tracing::debug!(path = %path, "Asset not found");
                StatusCode::NOT_FOUND.into_response()
            }
            Self::InvalidPath(path) => {
                tracing::warn!(path = %path, "Rejected asset path outside root");
                StatusCode::NOT_FOUND.into_response()
            }
            Self::Io(e) => {
                tracing::error!(error = %e, "Failed to read asset");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}
