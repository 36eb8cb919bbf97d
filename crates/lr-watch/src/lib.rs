//! Filesystem watching and change debouncing for LR.
//!
//! This crate turns filesystem mutations under a root directory into a
//! stream of payload-free reload signals:
//!
//! ```text
//! notify backend ──► Watcher ──ChangeEvent──► Debouncer ──Notification──► sink
//! ```
//!
//! - [`Watcher`] observes the root recursively, using native OS notifications
//!   when available and falling back to polling otherwise.
//! - [`Debouncer`] collapses bursts of [`ChangeEvent`]s into a single
//!   [`Notification`] after a quiet period.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use std::time::Duration;
//! use lr_watch::{Debouncer, WatchOptions, Watcher};
//!
//! let (watcher, changes) = Watcher::start(Path::new("dist"), &WatchOptions::default())?;
//! let debouncer = Debouncer::new(Duration::from_millis(100)).spawn(changes, |_| {
//!     tracing::info!("reload");
//! });
//! ```

mod debouncer;
mod error;
mod event;
mod watcher;

pub use debouncer::{DEFAULT_DEBOUNCE, Debouncer, QuietPeriod};
pub use error::WatchError;
pub use event::{ChangeEvent, ChangeReceiver, ChangeSender, Notification, change_channel};
pub use watcher::{WatchBackend, WatchOptions, Watcher};
