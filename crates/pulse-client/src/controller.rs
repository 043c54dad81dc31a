//! Stream controller — the client-side view of the event stream.
//!
//! The controller owns the recent-event ring and the consumer's pause and
//! filter state. Pause is a display concern only: the ring keeps filling
//! while paused so resuming shows what happened in between, and the
//! filter is applied at read time so changing it never discards buffered
//! events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use pulse_core::protocol::EventEnvelope;
use pulse_core::EventFilter;

use crate::ring::EventRing;

/// Where the client currently stands with the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connected and receiving.
    Live,
    /// Connection lost; retrying (zero-based attempt counter).
    Reconnecting {
        /// The attempt about to be made.
        attempt: u32,
    },
    /// Gave up after exhausting the reconnect budget.
    Disconnected,
}

/// Client-side stream state shared between the socket task and the
/// consumer (UI, exporter, test harness).
pub struct StreamController {
    ring: Mutex<EventRing>,
    filter: Mutex<EventFilter>,
    status: Mutex<ConnectionStatus>,
    paused: AtomicBool,
    pending_while_paused: AtomicU64,
}

impl StreamController {
    /// Controller with a ring of the given capacity.
    #[must_use]
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            ring: Mutex::new(EventRing::new(ring_capacity)),
            filter: Mutex::new(EventFilter::pass_all()),
            status: Mutex::new(ConnectionStatus::Reconnecting { attempt: 0 }),
            paused: AtomicBool::new(false),
            pending_while_paused: AtomicU64::new(0),
        }
    }

    /// Buffer one received event. The ring fills regardless of pause
    /// state; while paused the pending counter tracks what arrived.
    pub fn ingest(&self, envelope: EventEnvelope) {
        let _ = self.ring.lock().push(envelope);
        if self.is_paused() {
            let _ = self.pending_while_paused.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stop surfacing new events. Idempotent.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume surfacing events and reset the pending counter.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.pending_while_paused.store(0, Ordering::Relaxed);
    }

    /// Whether the consumer has paused the stream.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Events buffered since `pause()` was called.
    pub fn pending_while_paused(&self) -> u64 {
        self.pending_while_paused.load(Ordering::Relaxed)
    }

    /// Replace the read-time filter. Buffered events are untouched; they
    /// reappear if a later filter matches them again.
    pub fn set_filter(&self, filter: EventFilter) {
        *self.filter.lock() = filter;
    }

    /// Current read-time filter.
    pub fn filter(&self) -> EventFilter {
        self.filter.lock().clone()
    }

    /// Buffered events passing the current filter, oldest first.
    pub fn visible(&self) -> Vec<EventEnvelope> {
        let filter = self.filter.lock().clone();
        self.ring
            .lock()
            .iter()
            .filter(|e| filter.matches(&e.kind))
            .cloned()
            .collect()
    }

    /// Everything in the buffer, unfiltered, oldest first.
    pub fn buffered(&self) -> Vec<EventEnvelope> {
        self.ring.lock().iter().cloned().collect()
    }

    /// Events currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.ring.lock().len()
    }

    /// Total events evicted from the ring.
    pub fn evicted_count(&self) -> u64 {
        self.ring.lock().evicted_count()
    }

    /// Drop every buffered event.
    pub fn clear(&self) {
        self.ring.lock().clear();
    }

    /// Update the connection status (socket task only).
    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
