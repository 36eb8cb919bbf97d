//! Application state.
//!
//! Shared state for asset request handlers.

use std::path::PathBuf;

/// Asset server state shared across all handlers.
#[derive(Debug)]
pub(crate) struct AppState {
    /// Canonical root directory.
    pub(crate) root: PathBuf,
    /// Rendered reload agent (if live reload is enabled).
    pub(crate) agent_script: Option<String>,
    /// Insert the agent script tag into HTML responses.
    pub(crate) inject_agent: bool,
}
