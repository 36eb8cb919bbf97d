//! Recursive directory watcher with polling fallback.
//!
//! Uses the platform's native notification mechanism through `notify`. When
//! that backend cannot be created (e.g. the inotify watch limit is exhausted)
//! or reports an error later on, the watcher switches to `notify`'s polling
//! backend instead of giving up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher as _};
use notify::event::{MetadataKind, ModifyKind};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::WatchError;
use crate::event::{ChangeReceiver, ChangeSender, change_channel};

/// Default polling interval for the polling backend.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Notification backend in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchBackend {
    /// Native OS notifications (inotify, FSEvents, ReadDirectoryChangesW).
    Native,
    /// Periodic directory scans.
    Polling,
}

impl fmt::Display for WatchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Watcher options.
#[derive(Clone, Debug)]
pub struct WatchOptions {
    /// Skip native notifications and poll from the start.
    pub force_poll: bool,
    /// Interval between scans when polling.
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            force_poll: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Raw backend output tagged with the backend that produced it.
struct RawMessage {
    backend: WatchBackend,
    result: notify::Result<Event>,
}

type RawSender = mpsc::UnboundedSender<RawMessage>;

/// Owns the active `notify` backend and swaps it on failure.
struct Backends {
    root: PathBuf,
    poll_interval: Duration,
    raw_tx: RawSender,
    /// Held for its OS handle; dropping it stops notifications.
    active: Box<dyn notify::Watcher + Send>,
    kind: watch::Sender<WatchBackend>,
}

impl Backends {
    /// Create the initial backend, falling back to polling if native fails.
    fn open(
        root: PathBuf,
        options: &WatchOptions,
        raw_tx: RawSender,
    ) -> Result<Self, WatchError> {
        let (active, kind) = if options.force_poll {
            (
                polling_backend(&root, options.poll_interval, raw_tx.clone())?,
                WatchBackend::Polling,
            )
        } else {
            match native_backend(&root, raw_tx.clone()) {
                Ok(active) => (active, WatchBackend::Native),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        root = %root.display(),
                        "Native file watching unavailable, falling back to polling"
                    );
                    (
                        polling_backend(&root, options.poll_interval, raw_tx.clone())?,
                        WatchBackend::Polling,
                    )
                }
            }
        };

        let (kind, _) = watch::channel(kind);

        Ok(Self {
            root,
            poll_interval: options.poll_interval,
            raw_tx,
            active,
            kind,
        })
    }

    fn kind(&self) -> WatchBackend {
        *self.kind.borrow()
    }

    /// Handle an error reported by `from`.
    ///
    /// A native error switches to polling. Polling errors and stale errors
    /// from a replaced native backend are only logged.
    fn handle_error(&mut self, from: WatchBackend, error: &notify::Error) {
        if from != WatchBackend::Native || self.kind() != WatchBackend::Native {
            tracing::warn!(error = %error, backend = %from, "File watcher error");
            return;
        }

        match polling_backend(&self.root, self.poll_interval, self.raw_tx.clone()) {
            Ok(polling) => {
                tracing::warn!(
                    error = %error,
                    root = %self.root.display(),
                    "Native file watcher failed, switched to polling"
                );
                drop(std::mem::replace(&mut self.active, polling));
                self.kind.send_replace(WatchBackend::Polling);
            }
            Err(e) => {
                tracing::error!(
                    error = %error,
                    poll_error = %e,
                    "Native file watcher failed and polling is unavailable"
                );
            }
        }
    }
}

fn native_backend(
    root: &Path,
    raw_tx: RawSender,
) -> notify::Result<Box<dyn notify::Watcher + Send>> {
    let mut watcher = notify::recommended_watcher(move |result| {
        let _ = raw_tx.send(RawMessage {
            backend: WatchBackend::Native,
            result,
        });
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(Box::new(watcher))
}

fn polling_backend(
    root: &Path,
    poll_interval: Duration,
    raw_tx: RawSender,
) -> notify::Result<Box<dyn notify::Watcher + Send>> {
    let config = notify::Config::default().with_poll_interval(poll_interval);
    let mut watcher = notify::PollWatcher::new(
        move |result| {
            let _ = raw_tx.send(RawMessage {
                backend: WatchBackend::Polling,
                result,
            });
        },
        config,
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(Box::new(watcher))
}

/// Whether a raw event is a mutation of the tree.
///
/// Reads (including the asset server's own) surface as access events and
/// must not trigger reloads.
fn is_mutation(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime))
        | EventKind::Access(_)
        | EventKind::Other => false,
        EventKind::Any
        | EventKind::Create(_)
        | EventKind::Modify(_)
        | EventKind::Remove(_) => true,
    }
}

/// Recursive watcher over a root directory.
///
/// Produces a deduplicated stream of [`ChangeEvent`](crate::ChangeEvent)s
/// through the [`ChangeReceiver`] returned by [`Watcher::start`]. Dropping the
/// watcher, or calling [`Watcher::shutdown`], stops the background task and
/// releases the OS watch handle.
pub struct Watcher {
    root: PathBuf,
    backend: watch::Receiver<WatchBackend>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Start watching `root` recursively.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RootNotFound`] if `root` is not a directory and
    /// [`WatchError::Init`] if no backend can watch it.
    pub fn start(
        root: &Path,
        options: &WatchOptions,
    ) -> Result<(Self, ChangeReceiver), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::RootNotFound(root.to_path_buf()));
        }
        let root = root.canonicalize()?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let backends = Backends::open(root.clone(), options, raw_tx)?;
        let backend = backends.kind.subscribe();

        let (changes_tx, changes_rx) = change_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tracing::info!(
            root = %root.display(),
            backend = %backends.kind(),
            "Watching for changes"
        );

        let task = tokio::spawn(run(backends, raw_rx, changes_tx, shutdown_rx));

        Ok((
            Self {
                root,
                backend,
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            changes_rx,
        ))
    }

    /// Canonical root being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backend currently in use.
    #[must_use]
    pub fn backend(&self) -> WatchBackend {
        *self.backend.borrow()
    }

    /// Stop watching and wait until the OS handle has been released.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("root", &self.root)
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

/// Background loop: forward mutations, switch backends on error.
///
/// The backend is dropped when this returns, which stops OS notifications.
async fn run(
    mut backends: Backends,
    mut raw_rx: mpsc::UnboundedReceiver<RawMessage>,
    changes: ChangeSender,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            message = raw_rx.recv() => {
                let Some(RawMessage { backend, result }) = message else {
                    break;
                };
                match result {
                    Ok(event) if is_mutation(&event.kind) => {
                        tracing::trace!(kind = ?event.kind, paths = ?event.paths, "Filesystem change");
                        if !changes.signal() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => backends.handle_error(backend, &e),
                }
            }
        }
    }

    tracing::debug!(root = %backends.root.display(), "Watcher stopped");
}
