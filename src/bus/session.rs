//! Per-session ordered event queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};

use super::event::Event;

/// A client-scoped event queue.
///
/// Publishing never blocks and is safe from any number of tasks; a single
/// delivery loop consumes events in publish order.
#[derive(Debug)]
pub struct Session {
    key: String,
    tx: mpsc::UnboundedSender<Event>,
    rx: Mutex<mpsc::UnboundedReceiver<Event>>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Session {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            key: key.into(),
            tx,
            rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue an event. Returns `false` if the session is closed.
    pub fn publish(&self, event: Event) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    /// Mark the session closed; later publishes are dropped.
    ///
    /// A consumer parked in [`Session::next_timeout`] wakes up and discards
    /// whatever is still queued.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.close_signal.notify_waiters();
    }

    /// Pop the next event without waiting.
    ///
    /// Returns `None` when the queue is empty or another consumer currently
    /// holds the receiver.
    pub fn try_next(&self) -> Option<Event> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout or once the session is closed; events still
    /// queued at close are discarded rather than returned.
    pub async fn next_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut rx = self.rx.lock().await;
        let closed = self.close_signal.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        let event = if self.is_closed() {
            None
        } else {
            tokio::select! {
                event = rx.recv() => event,
                _ = &mut closed => None,
                _ = tokio::time::sleep(timeout) => None,
            }
        };
        if self.is_closed() {
            let dropped = discard(&mut rx) + usize::from(event.is_some());
            if dropped > 0 {
                tracing::debug!(session = %self.key, dropped, "discarded events queued before close");
            }
            return None;
        }
        event
    }

    /// Discard every buffered event, returning how many were dropped.
    ///
    /// When a consumer is parked on the queue this returns 0 and the
    /// consumer discards the backlog itself once the session is closed.
    pub fn drain(&self) -> usize {
        match self.rx.try_lock() {
            Ok(mut rx) => discard(&mut rx),
            Err(_) => 0,
        }
    }
}

fn discard(rx: &mut mpsc::UnboundedReceiver<Event>) -> usize {
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}
