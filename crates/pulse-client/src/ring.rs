//! Bounded ring of recent events.

use std::collections::VecDeque;

use pulse_core::protocol::EventEnvelope;

/// Default capacity for the recent-event buffer.
pub const DEFAULT_RING_CAPACITY: usize = 500;

/// Fixed-capacity buffer keeping the newest events; pushing into a full
/// ring evicts the oldest entry.
#[derive(Debug)]
pub struct EventRing {
    buf: VecDeque<EventEnvelope>,
    capacity: usize,
    evicted: u64,
}

impl EventRing {
    /// Create a ring holding up to `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an event, returning the evicted oldest entry if the ring
    /// was full.
    pub fn push(&mut self, envelope: EventEnvelope) -> Option<EventEnvelope> {
        let evicted = if self.buf.len() == self.capacity {
            self.evicted += 1;
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(envelope);
        evicted
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.buf.iter()
    }

    /// Events currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the ring holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events evicted since creation.
    #[must_use]
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    /// Drop every buffered event. The evicted counter is kept.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
