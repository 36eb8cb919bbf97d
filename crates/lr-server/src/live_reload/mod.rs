//! Live reload: change notifications pushed to connected browsers.

mod agent;
mod broadcaster;
mod connection;
mod manager;
mod websocket;

pub use agent::{AGENT_PATH, render_agent};
pub use broadcaster::{Broadcaster, ClientId, Subscription};
pub use connection::{ConnectionEvent, ConnectionState};
pub use manager::LiveReloadOptions;
pub(crate) use manager::LiveReload;
pub use websocket::RELOAD_FRAME;
pub(crate) use websocket::{ReloadState, ws_handler};
