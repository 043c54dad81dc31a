//! Per-connection state and the bounded outbound queue.
//!
//! The queue evicts its OLDEST entry when full, so a slow consumer sees
//! the most recent events when it catches up. Enqueue never blocks; the
//! writer task drains via [`ConnectionHandle::next_outbound`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pulse_core::{ConnectionId, Event, EventFilter};
use tokio::sync::Notify;

/// Connection lifecycle states.
///
/// Handshake and auth happen in the HTTP upgrade path before a handle
/// exists; rejected upgrades never get one. A handle is born `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Receiving events.
    Active,
    /// Drain suspended by the client; the queue keeps filling.
    Paused,
    /// Teardown in progress.
    Closing,
    /// Fully deregistered.
    Closed,
}

/// What happened to an event offered to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Queued for delivery.
    Queued,
    /// Queued, and the oldest queued event was evicted to make room.
    QueuedEvictedOldest,
    /// The connection's filter did not match; not a drop.
    Filtered,
    /// The connection is closing or closed.
    Closed,
}

/// A connected viewer, shared between the registry and its session task.
pub struct ConnectionHandle {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated user, once past the auth gate.
    pub user_id: Option<String>,
    /// When this connection was established.
    pub connected_at: Instant,
    state: Mutex<ConnectionState>,
    filter: Mutex<EventFilter>,
    subscriptions: Mutex<HashSet<String>>,
    queue: Mutex<VecDeque<Arc<str>>>,
    queue_capacity: usize,
    notify: Notify,
    /// Whether the client has responded since the last ping.
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped: AtomicU64,
    filtered: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle in the `Active` state.
    #[must_use]
    pub fn new(id: ConnectionId, user_id: Option<String>, queue_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id,
            connected_at: now,
            state: Mutex::new(ConnectionState::Active),
            filter: Mutex::new(EventFilter::pass_all()),
            subscriptions: Mutex::new(HashSet::new()),
            queue: Mutex::new(VecDeque::with_capacity(queue_capacity.min(64))),
            queue_capacity: queue_capacity.max(1),
            notify: Notify::new(),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the connection has reached `Closing` or `Closed`.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        )
    }

    /// Whether draining is suspended.
    pub fn is_paused(&self) -> bool {
        self.state() == ConnectionState::Paused
    }

    /// Suspend draining. No-op unless currently `Active`.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Active {
            *state = ConnectionState::Paused;
        }
    }

    /// Resume draining, oldest queued event first. No-op unless `Paused`.
    pub fn resume(&self) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Paused {
                *state = ConnectionState::Active;
            }
        }
        self.notify.notify_waiters();
    }

    /// Begin teardown. Idempotent; wakes the drain task so it can exit.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Closing;
            }
        }
        self.notify.notify_waiters();
    }

    /// Mark teardown complete. Called after the registry has removed the
    /// connection from every topic.
    pub fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Closed;
        self.notify.notify_waiters();
    }

    /// Replace the filter atomically. Already-queued events are untouched.
    pub fn set_filter(&self, filter: EventFilter) {
        *self.filter.lock() = filter;
    }

    /// Snapshot of the current filter.
    pub fn filter(&self) -> EventFilter {
        self.filter.lock().clone()
    }

    /// Record a topic join. Returns `false` if already subscribed.
    pub fn add_subscription(&self, topic: &str) -> bool {
        self.subscriptions.lock().insert(topic.to_string())
    }

    /// Record a topic leave. Returns `false` if not subscribed.
    pub fn remove_subscription(&self, topic: &str) -> bool {
        self.subscriptions.lock().remove(topic)
    }

    /// Take all subscriptions, leaving the set empty.
    pub fn take_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().drain().collect()
    }

    /// Snapshot of current subscriptions.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    /// Offer an event to this connection. Never blocks.
    ///
    /// `json` is the shared serialized envelope produced once per publish.
    pub fn enqueue(&self, event: &Event, json: &Arc<str>) -> EnqueueOutcome {
        if self.is_closed() {
            return EnqueueOutcome::Closed;
        }
        if !self.filter.lock().matches(&event.kind) {
            let _ = self.filtered.fetch_add(1, Ordering::Relaxed);
            return EnqueueOutcome::Filtered;
        }

        let evicted = {
            let mut queue = self.queue.lock();
            queue.push_back(Arc::clone(json));
            if queue.len() > self.queue_capacity {
                let _ = queue.pop_front();
                true
            } else {
                false
            }
        };
        self.notify.notify_waiters();

        if evicted {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            EnqueueOutcome::QueuedEvictedOldest
        } else {
            EnqueueOutcome::Queued
        }
    }

    /// Wait for the next outbound message.
    ///
    /// Returns `None` once the connection is closing. While paused, queued
    /// messages are held back until [`resume`](Self::resume).
    pub async fn next_outbound(&self) -> Option<Arc<str>> {
        loop {
            if self.is_closed() {
                return None;
            }
            if !self.is_paused() {
                if let Some(msg) = self.queue.lock().pop_front() {
                    return Some(msg);
                }
            }
            let notified = self.notify.notified();
            // Re-check after arming the waiter so a notify between the
            // checks above and here is not lost.
            if self.is_closed() {
                return None;
            }
            if !self.is_paused() && !self.queue.lock().is_empty() {
                continue;
            }
            notified.await;
        }
    }

    /// Events evicted from the queue because it was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events suppressed by the connection's filter.
    pub fn filtered_count(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Currently queued, undelivered messages.
    pub fn queued_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Mark the connection as alive (pong or any frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
