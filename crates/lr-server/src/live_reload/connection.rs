//! Per-client connection lifecycle.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use super::broadcaster::ClientId;

/// Lifecycle state of a notification client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, not yet registered.
    #[default]
    Connecting,
    /// Registered and waiting for notifications.
    Registered,
    /// A notification is being written.
    Notifying,
    /// Terminal cleanup in progress.
    Closing,
    /// Unregistered and transport released.
    Closed,
}

impl ConnectionState {
    /// Apply `event` and return the next state.
    ///
    /// `Closed` is absorbing and `Closing` only leaves on [`ConnectionEvent::Released`].
    #[must_use]
    pub fn next(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (S::Closed, _) | (S::Closing, E::Released) => S::Closed,
            (S::Closing, _) | (_, E::WriteFailed | E::TransportClosed | E::Shutdown) => {
                S::Closing
            }
            (S::Connecting, E::Accepted) => S::Registered,
            (S::Registered, E::NotificationQueued) => S::Notifying,
            (S::Notifying, E::WriteSucceeded) => S::Registered,
            (state, _) => state,
        }
    }

    /// Whether the connection can still receive notifications.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Registered | Self::Notifying)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Registered => "registered",
            Self::Notifying => "notifying",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Input driving [`ConnectionState`] transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Client was added to the registry.
    Accepted,
    /// A notification was taken from the client's queue.
    NotificationQueued,
    /// Frame written to the transport.
    WriteSucceeded,
    /// Frame could not be written.
    WriteFailed,
    /// Peer closed the transport or it errored.
    TransportClosed,
    /// Server is shutting down.
    Shutdown,
    /// Client unregistered and transport dropped.
    Released,
}

/// Tracks the state of one client connection.
#[derive(Debug)]
pub(crate) struct Connection {
    id: ClientId,
    state: ConnectionState,
}

impl Connection {
    pub(crate) fn new(id: ClientId) -> Self {
        Self {
            id,
            state: ConnectionState::default(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn apply(&mut self, event: ConnectionEvent) -> ConnectionState {
        let next = self.state.next(event);
        if next != self.state {
            tracing::trace!(
                client_id = %self.id,
                from = %self.state,
                to = %next,
                ?event,
                "Connection state changed"
            );
        }
        self.state = next;
        next
    }
}

/// Connection handler tasks owned by the live reload pipeline.
///
/// Once [`abort_all`](Self::abort_all) has run no new handler is started,
/// so no socket outlives shutdown.
#[derive(Clone)]
pub(crate) struct ConnectionTasks {
    set: Arc<Mutex<Option<JoinSet<()>>>>,
}

impl ConnectionTasks {
    pub(crate) fn new() -> Self {
        Self {
            set: Arc::new(Mutex::new(Some(JoinSet::new()))),
        }
    }

    /// Run a handler. Returns `false` and drops it after shutdown.
    pub(crate) fn spawn<F>(&self, handler: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.set.lock();
        let Some(set) = guard.as_mut() else {
            return false;
        };
        while set.try_join_next().is_some() {}
        set.spawn(handler);
        true
    }

    /// Number of handlers not yet reaped.
    pub(crate) fn len(&self) -> usize {
        self.set.lock().as_ref().map_or(0, JoinSet::len)
    }

    /// Abort every remaining handler and wait for them to finish.
    pub(crate) async fn abort_all(&self) {
        let Some(mut set) = self.set.lock().take() else {
            return;
        };
        let remaining = set.len();
        set.abort_all();
        while set.join_next().await.is_some() {}
        tracing::debug!(remaining, "Connection handlers stopped");
    }
}
