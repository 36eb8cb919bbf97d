//! Development server for LR.
//!
//! Serves a build output directory over HTTP and pushes a reload
//! notification to every connected browser when files in it change.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use lr_server::{LiveReloadOptions, ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         host: "127.0.0.1".to_owned(),
//!         port: 8080,
//!         root_dir: PathBuf::from("dist"),
//!         live_reload: Some(LiveReloadOptions::default()),
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► asset listener ──► root directory (read-only)
//!    ▲
//!    └──WebSocket── notification listener ◄── Broadcaster
//!                                                  ▲
//!                          Watcher ──► Debouncer ──┘
//! ```
//!
//! The two listeners share nothing but the root directory, so slow asset
//! requests never delay notifications and vice versa.

mod app;
mod assets;
mod error;
mod live_reload;
mod middleware;
mod state;
mod static_files;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use error::{AssetError, ServerError};
pub use live_reload::{
    AGENT_PATH, Broadcaster, ClientId, ConnectionEvent, ConnectionState, LiveReloadOptions,
    RELOAD_FRAME, Subscription, render_agent,
};
pub use lr_watch::{Notification, WatchBackend};

use live_reload::LiveReload;
use state::AppState;

/// Upper bound for listeners to finish in-flight requests on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Asset server host address.
    pub host: String,
    /// Asset server port.
    pub port: u16,
    /// Directory to serve and watch.
    pub root_dir: PathBuf,
    /// Live reload settings (`None` disables live reload).
    pub live_reload: Option<LiveReloadOptions>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            root_dir: PathBuf::from("dist"),
            live_reload: Some(LiveReloadOptions::default()),
        }
    }
}

/// Create server configuration from LR config.
#[must_use]
pub fn server_config_from_lr_config(config: &lr_config::Config) -> ServerConfig {
    let live_reload = config.live_reload.enabled.then(|| LiveReloadOptions {
        host: config.live_reload.host.clone(),
        port: config.live_reload.port,
        debounce: config.live_reload.debounce(),
        queue_capacity: config.live_reload.queue_capacity,
        force_poll: config.live_reload.force_poll,
        poll_interval: config.live_reload.poll_interval(),
        inject_agent: config.live_reload.inject_agent,
    });

    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root_dir: config.assets_resolved.root_dir.clone(),
        live_reload,
    }
}

/// Running development server.
///
/// Both listeners are bound by the time [`DevServer::start`] returns.
pub struct DevServer {
    root: PathBuf,
    asset_addr: SocketAddr,
    reload_addr: Option<SocketAddr>,
    live_reload: Option<LiveReload>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<io::Result<()>>>,
}

impl DevServer {
    /// Bind the listeners, start watching and begin serving.
    ///
    /// Fails fast if the root is missing, a port is unavailable, or the
    /// watcher cannot be initialized.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        if !config.root_dir.is_dir() {
            return Err(ServerError::RootNotFound(config.root_dir));
        }
        let root = config.root_dir.canonicalize()?;

        let asset_listener = bind(&config.host, config.port).await?;
        let asset_addr = asset_listener.local_addr()?;

        let reload = match &config.live_reload {
            Some(options) => {
                let listener = bind(&options.host, options.port).await?;
                let addr = listener.local_addr()?;
                let live_reload = LiveReload::start(&root, options)?;
                Some((listener, addr, live_reload, options))
            }
            None => None,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(2);

        let agent_script = reload
            .as_ref()
            .map(|(_, addr, _, options)| render_agent(&options.host, addr.port()));
        let inject_agent = reload
            .as_ref()
            .is_some_and(|(_, _, _, options)| options.inject_agent);
        let state = Arc::new(AppState {
            root: root.clone(),
            agent_script,
            inject_agent,
        });
        tasks.push(serve(
            asset_listener,
            app::create_router(state),
            shutdown_rx.clone(),
        ));
        tracing::info!(address = %asset_addr, root = %root.display(), "Asset server listening");

        let (reload_addr, live_reload) = match reload {
            Some((listener, addr, live_reload, _)) => {
                let router = app::create_reload_router(live_reload.reload_state());
                tasks.push(serve(listener, router, shutdown_rx));
                tracing::info!(address = %addr, "Notification server listening");
                (Some(addr), Some(live_reload))
            }
            None => (None, None),
        };

        Ok(Self {
            root,
            asset_addr,
            reload_addr,
            live_reload,
            shutdown_tx,
            tasks,
        })
    }

    /// Canonical root directory.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Bound asset server address.
    #[must_use]
    pub fn asset_addr(&self) -> SocketAddr {
        self.asset_addr
    }

    /// Bound notification server address, if live reload is enabled.
    #[must_use]
    pub fn reload_addr(&self) -> Option<SocketAddr> {
        self.reload_addr
    }

    /// Active watch backend, if live reload is enabled.
    #[must_use]
    pub fn watch_backend(&self) -> Option<WatchBackend> {
        self.live_reload.as_ref().map(LiveReload::backend)
    }

    /// Notification broadcaster, if live reload is enabled.
    #[must_use]
    pub fn broadcaster(&self) -> Option<&Broadcaster> {
        self.live_reload.as_ref().map(LiveReload::broadcaster)
    }

    /// Number of connected notification clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.broadcaster().map_or(0, Broadcaster::client_count)
    }

    /// Stop watching, disconnect clients and stop both listeners.
    pub async fn shutdown(self) {
        if let Some(live_reload) = self.live_reload {
            live_reload.shutdown().await;
        }

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let abort = task.abort_handle();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Listener stopped with error"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Listener task failed"),
                Err(_) => {
                    tracing::warn!("Listener did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        tracing::info!("Server stopped");
    }
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("root", &self.root)
            .field("asset_addr", &self.asset_addr)
            .field("reload_addr", &self.reload_addr)
            .finish_non_exhaustive()
    }
}

/// Run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let server = DevServer::start(config).await?;
    shutdown_signal().await;
    server.shutdown().await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })
}

fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    })
}
