//! WebSocket handler for reload notifications.
//!
//! Each accepted socket registers with the [`Broadcaster`] and writes one
//! [`RELOAD_FRAME`] per notification until either side goes away.

use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::broadcaster::{Broadcaster, Subscription};
use super::connection::{Connection, ConnectionEvent, ConnectionTasks};

/// Text frame sent to clients on every notification.
pub const RELOAD_FRAME: &str = "reload";

/// Upper bound for writing one frame before the client is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for writing the close frame during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// State of the notification router.
#[derive(Clone)]
pub(crate) struct ReloadState {
    pub(crate) broadcaster: Broadcaster,
    pub(crate) tasks: ConnectionTasks,
}

/// Handle WebSocket upgrade for reload notifications.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ReloadState>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| tracing::debug!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let ReloadState { broadcaster, tasks } = state;
            if !tasks.spawn(handle_socket(socket, broadcaster)) {
                tracing::debug!("Connection refused during shutdown");
            }
        })
}

/// Drive an established connection until it closes.
async fn handle_socket(mut socket: WebSocket, broadcaster: Broadcaster) {
    let mut subscription = broadcaster.subscribe();
    let mut connection = Connection::new(subscription.id());
    connection.apply(ConnectionEvent::Accepted);

    let mut shutting_down = false;

    while connection.state().is_active() {
        tokio::select! {
            notification = subscription.recv() => {
                if notification.is_none() {
                    connection.apply(ConnectionEvent::Shutdown);
                    shutting_down = true;
                    break;
                }

                connection.apply(ConnectionEvent::NotificationQueued);
                let event = write_frame(&mut socket, &subscription).await;
                shutting_down = event == ConnectionEvent::Shutdown;
                connection.apply(event);
            }
            message = socket.recv() => {
                match message {
                    // Client frames carry no meaning; pings are answered by axum.
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        connection.apply(ConnectionEvent::TransportClosed);
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    if shutting_down
        && tokio::time::timeout(CLOSE_TIMEOUT, socket.send(Message::Close(None)))
            .await
            .is_err()
    {
        tracing::debug!(client_id = %subscription.id(), "Close frame timed out");
    }

    let id = subscription.id();
    drop(socket);
    drop(subscription);
    connection.apply(ConnectionEvent::Released);
    tracing::debug!(client_id = %id, state = %connection.state(), "Connection released");
}

/// Write one reload frame.
///
/// A peer that stops reading cannot hold the handler: the write is bounded
/// by [`WRITE_TIMEOUT`] and abandoned as soon as the client is closed.
async fn write_frame(socket: &mut WebSocket, subscription: &Subscription) -> ConnectionEvent {
    tokio::select! {
        result = tokio::time::timeout(WRITE_TIMEOUT, socket.send(Message::Text(RELOAD_FRAME.into()))) => {
            match result {
                Ok(Ok(())) => ConnectionEvent::WriteSucceeded,
                Ok(Err(e)) => {
                    tracing::debug!(client_id = %subscription.id(), error = %e, "Write failed");
                    ConnectionEvent::WriteFailed
                }
                Err(_) => {
                    tracing::debug!(client_id = %subscription.id(), "Write timed out");
                    ConnectionEvent::WriteFailed
                }
            }
        }
        () = subscription.closed() => ConnectionEvent::Shutdown,
    }
}
