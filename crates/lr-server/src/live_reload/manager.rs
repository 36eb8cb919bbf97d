//! Live reload pipeline.
//!
//! Wires the watcher, debouncer and broadcaster together:
//!
//! ```text
//! Watcher ──ChangeEvent──► Debouncer ──Notification──► Broadcaster ──► clients
//! ```

use std::path::Path;
use std::time::{Duration, Instant};

use lr_watch::{Debouncer, WatchBackend, WatchOptions, Watcher};
use tokio::task::JoinHandle;

use super::broadcaster::Broadcaster;
use super::connection::ConnectionTasks;
use super::websocket::ReloadState;
use crate::error::ServerError;

/// Upper bound for connection handlers to release their clients on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Live reload settings.
#[derive(Clone, Debug)]
pub struct LiveReloadOptions {
    /// Host the notification endpoint binds to.
    pub host: String,
    /// Port the notification endpoint listens on.
    pub port: u16,
    /// Quiet period before a change burst becomes a notification.
    pub debounce: Duration,
    /// Per-client pending notification limit.
    pub queue_capacity: usize,
    /// Skip native notifications and poll instead.
    pub force_poll: bool,
    /// Poll interval when polling.
    pub poll_interval: Duration,
    /// Insert the agent script tag into served HTML pages.
    pub inject_agent: bool,
}

impl Default for LiveReloadOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 35729,
            debounce: lr_watch::DEFAULT_DEBOUNCE,
            queue_capacity: 8,
            force_poll: false,
            poll_interval: Duration::from_millis(500),
            inject_agent: true,
        }
    }
}

/// Running watch, debounce and broadcast pipeline.
pub(crate) struct LiveReload {
    broadcaster: Broadcaster,
    tasks: ConnectionTasks,
    watcher: Watcher,
    debouncer: JoinHandle<()>,
}

impl LiveReload {
    /// Start watching `root` and broadcasting notifications.
    ///
    /// Must be called within a Tokio runtime.
    pub(crate) fn start(root: &Path, options: &LiveReloadOptions) -> Result<Self, ServerError> {
        let broadcaster = Broadcaster::new(options.queue_capacity);

        let watch_options = WatchOptions {
            force_poll: options.force_poll,
            poll_interval: options.poll_interval,
        };
        let (watcher, changes) = Watcher::start(root, &watch_options)?;

        let publisher = broadcaster.clone();
        let debouncer = Debouncer::new(options.debounce).spawn(changes, move |notification| {
            let start = Instant::now();
            let clients = publisher.publish(notification);
            tracing::info!(
                clients,
                elapsed_ms = start.elapsed().as_millis(),
                "Reload notification broadcast"
            );
        });

        tracing::info!(
            root = %watcher.root().display(),
            backend = %watcher.backend(),
            debounce_ms = options.debounce.as_millis(),
            "Live reload started"
        );

        Ok(Self {
            broadcaster,
            tasks: ConnectionTasks::new(),
            watcher,
            debouncer,
        })
    }

    pub(crate) fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// State for the notification router.
    pub(crate) fn reload_state(&self) -> ReloadState {
        ReloadState {
            broadcaster: self.broadcaster.clone(),
            tasks: self.tasks.clone(),
        }
    }

    pub(crate) fn backend(&self) -> WatchBackend {
        self.watcher.backend()
    }

    /// Stop watching, close every client and wait for handlers to release them.
    ///
    /// Handlers still running after [`DRAIN_TIMEOUT`] are aborted, so no
    /// client socket outlives this call.
    pub(crate) async fn shutdown(self) {
        self.debouncer.abort();
        self.watcher.shutdown().await;
        self.broadcaster.shutdown();

        if tokio::time::timeout(DRAIN_TIMEOUT, self.broadcaster.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                clients = self.broadcaster.client_count(),
                "Timed out waiting for clients to disconnect, aborting handlers"
            );
        }
        self.tasks.abort_all().await;

        tracing::debug!("Live reload stopped");
    }
}
