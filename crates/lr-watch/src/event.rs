//! Change signal types.
//!
//! Both signals carry no payload: any change under the root triggers a full
//! page reload, so which file changed is irrelevant.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// "The watched tree changed."
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeEvent;

/// "Reload now." Emitted at most once per debounce window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Notification;

/// Create a deduplicating change channel.
///
/// The channel holds at most one pending [`ChangeEvent`]. Signals sent while
/// one is already pending are folded into it.
#[must_use]
pub fn change_channel() -> (ChangeSender, ChangeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ChangeSender { tx }, ChangeReceiver { rx })
}

/// Sending half of a change channel.
#[derive(Clone, Debug)]
pub struct ChangeSender {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChangeSender {
    /// Signal a change without blocking.
    ///
    /// Returns `false` once the receiver has been dropped.
    pub fn signal(&self) -> bool {
        match self.tx.try_send(ChangeEvent) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Receiving half of a change channel.
///
/// Yields `None` once the producing [`Watcher`](crate::Watcher) has stopped.
#[derive(Debug)]
pub struct ChangeReceiver {
    rx: mpsc::Receiver<ChangeEvent>,
}

impl ChangeReceiver {
    /// Wait for the next change.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take a pending change without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}
