//! Client registry and notification fan-out.
//!
//! Every connected client owns a bounded outbound queue. [`Broadcaster::publish`]
//! pushes into all queues while holding the registry lock, so it is
//! linearizable with [`Broadcaster::subscribe`] and unregistration. Pushing
//! never waits on a client: a full queue drops its stale notifications and
//! keeps only the newest one, since any reload supersedes earlier ones.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lr_watch::Notification;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Unique identifier of a connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Result of pushing into a client queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PushOutcome {
    Queued,
    /// Queue was full; `dropped` stale notifications were discarded.
    Overflowed { dropped: usize },
    Closed,
}

struct QueueState {
    pending: VecDeque<Notification>,
    open: bool,
}

/// Bounded single-consumer queue with drop-oldest overflow.
struct ClientQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    ready: Notify,
    closed: Notify,
}

impl ClientQueue {
    fn new(capacity: usize, open: bool) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                pending: VecDeque::with_capacity(capacity.max(1)),
                open,
            }),
            ready: Notify::new(),
            closed: Notify::new(),
        }
    }

    fn push(&self, notification: Notification) -> PushOutcome {
        let mut state = self.state.lock();
        if !state.open {
            return PushOutcome::Closed;
        }

        let outcome = if state.pending.len() >= self.capacity {
            let dropped = state.pending.len();
            state.pending.clear();
            PushOutcome::Overflowed { dropped }
        } else {
            PushOutcome::Queued
        };
        state.pending.push_back(notification);
        drop(state);

        self.ready.notify_one();
        outcome
    }

    /// Close the queue, discarding anything still pending.
    fn close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        state.pending.clear();
        drop(state);

        self.ready.notify_one();
        self.closed.notify_waiters();
    }

    /// Resolve once the queue has been closed.
    async fn wait_closed(&self) {
        loop {
            let closed = self.closed.notified();
            tokio::pin!(closed);
            closed.as_mut().enable();

            if !self.is_open() {
                return;
            }
            closed.await;
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    async fn pop(&self) -> Option<Notification> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(notification) = state.pending.pop_front() {
                    return Some(notification);
                }
                if !state.open {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }
}

#[derive(Default)]
struct Registry {
    clients: HashMap<ClientId, Arc<ClientQueue>>,
    shut_down: bool,
}

struct Inner {
    queue_capacity: usize,
    next_id: AtomicU64,
    registry: Mutex<Registry>,
    idle: Notify,
}

impl Inner {
    fn unregister(&self, id: ClientId) {
        let mut registry = self.registry.lock();
        let Some(queue) = registry.clients.remove(&id) else {
            return;
        };
        queue.close();
        let remaining = registry.clients.len();
        drop(registry);

        tracing::debug!(client_id = %id, clients = remaining, "Client unregistered");
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// Pub/sub hub for reload notifications.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    /// Create a broadcaster whose clients buffer at most `queue_capacity`
    /// pending notifications (minimum 1).
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_capacity: queue_capacity.max(1),
                next_id: AtomicU64::new(1),
                registry: Mutex::new(Registry::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Register a new client.
    ///
    /// After [`shutdown`](Self::shutdown) the returned subscription is
    /// already closed and never enters the registry.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = ClientId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let mut registry = self.inner.registry.lock();
        let queue = Arc::new(ClientQueue::new(
            self.inner.queue_capacity,
            !registry.shut_down,
        ));
        if registry.shut_down {
            drop(registry);
            tracing::debug!(client_id = %id, "Rejected client after shutdown");
        } else {
            registry.clients.insert(id, Arc::clone(&queue));
            let clients = registry.clients.len();
            drop(registry);
            tracing::debug!(client_id = %id, clients, "Client registered");
        }

        Subscription {
            id,
            queue,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Deliver a notification to every registered client.
    ///
    /// Never blocks on a client. Returns the number of clients the
    /// notification was queued for.
    pub fn publish(&self, notification: Notification) -> usize {
        let registry = self.inner.registry.lock();
        let mut delivered = 0;

        for (id, queue) in &registry.clients {
            match queue.push(notification) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::Overflowed { dropped } => {
                    delivered += 1;
                    tracing::debug!(
                        client_id = %id,
                        dropped,
                        "Client queue full, dropped stale notifications"
                    );
                }
                PushOutcome::Closed => {}
            }
        }

        delivered
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.registry.lock().clients.len()
    }

    /// Close every client queue.
    ///
    /// Handlers observe the closed queue, release their transport and
    /// unregister. Use [`wait_idle`](Self::wait_idle) to wait for that.
    pub fn shutdown(&self) {
        let mut registry = self.inner.registry.lock();
        registry.shut_down = true;
        for queue in registry.clients.values() {
            queue.close();
        }
        let clients = registry.clients.len();
        drop(registry);

        tracing::debug!(clients, "Broadcaster shut down");
    }

    /// Wait until no client remains registered.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.inner.registry.lock().clients.is_empty() {
                return;
            }
            idle.await;
        }
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("queue_capacity", &self.inner.queue_capacity)
            .field("clients", &self.client_count())
            .finish()
    }
}

/// Handle bound to one registered client.
///
/// Dropping the subscription unregisters the client.
pub struct Subscription {
    id: ClientId,
    queue: Arc<ClientQueue>,
    inner: Arc<Inner>,
}

impl Subscription {
    /// Client identifier.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Wait for the next notification, in publish order.
    ///
    /// Returns `None` once the client has been closed.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.queue.pop().await
    }

    /// Resolve once the client has been closed by shutdown or unregistration.
    pub async fn closed(&self) {
        self.queue.wait_closed().await;
    }

    /// Whether the client is still accepting notifications.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.queue.is_open()
    }

    /// Number of notifications waiting to be written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Unregister now instead of on drop.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.unregister(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
