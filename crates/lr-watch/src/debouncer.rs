//! Quiet-period debouncing of change events.
//!
//! Build tools write many files per build. Every raw [`ChangeEvent`] restarts
//! a timer of fixed duration; only when the timer elapses without another
//! event is a single [`Notification`] emitted.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::event::{ChangeReceiver, Notification};

/// Default quiet period.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Single pending timer of a trailing-edge debouncer.
#[derive(Debug)]
pub struct QuietPeriod {
    duration: Duration,
    deadline: Option<Instant>,
}

impl QuietPeriod {
    /// Create an idle quiet period of the given duration.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    /// Quiet period duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Record a change observed at `now`, starting or restarting the timer.
    pub fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.duration);
    }

    /// Consume the timer if it has elapsed at `now`.
    ///
    /// Returns `true` exactly once per elapsed quiet period.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Deadline of the pending timer, for scheduling.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a timer is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Async driver for a [`QuietPeriod`].
#[derive(Debug)]
pub struct Debouncer {
    period: QuietPeriod,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            period: QuietPeriod::new(duration),
        }
    }

    /// Consume `changes`, calling `sink` once per elapsed quiet period.
    ///
    /// Returns when the change stream ends. A pending timer is discarded at
    /// that point.
    pub async fn run<F>(mut self, mut changes: ChangeReceiver, mut sink: F)
    where
        F: FnMut(Notification),
    {
        loop {
            let deadline = self.period.next_deadline();

            tokio::select! {
                change = changes.recv() => {
                    if change.is_none() {
                        break;
                    }
                    self.period.record(Instant::now());
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.period.take_ready(Instant::now()) {
                        tracing::debug!(
                            quiet_ms = self.period.duration().as_millis(),
                            "Change burst settled"
                        );
                        sink(Notification);
                    }
                }
            }
        }

        tracing::debug!("Debouncer stopped");
    }

    /// Run the debouncer as a background task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn<F>(self, changes: ChangeReceiver, sink: F) -> JoinHandle<()>
    where
        F: FnMut(Notification) + Send + 'static,
    {
        tokio::spawn(self.run(changes, sink))
    }
}
