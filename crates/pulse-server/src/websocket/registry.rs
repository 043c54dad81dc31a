//! Topic registry — membership and fan-out.
//!
//! Invariant: a connection is in a topic's member map iff the topic is in
//! the connection's subscription set; both sides are updated while holding
//! the topic's entry lock. Publishing serializes the event once and offers
//! the shared JSON to every member without blocking on any of them.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use pulse_core::protocol::EventEnvelope;
use pulse_core::{ConnectionId, Event};
use tracing::{debug, warn};

use super::connection::{ConnectionHandle, EnqueueOutcome};
use crate::metrics as metric_names;

/// Tracks every live connection and which topics each one is in.
#[derive(Default)]
pub struct TopicRegistry {
    topics: DashMap<String, HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl TopicRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Must be called before any `join`.
    pub fn register(&self, conn: Arc<ConnectionHandle>) {
        let _ = self.connections.insert(conn.id.clone(), conn);
    }

    /// Add a connection to a topic, creating the topic if needed.
    ///
    /// Returns `false` if the connection was already a member.
    pub fn join(&self, topic: &str, conn: &Arc<ConnectionHandle>) -> bool {
        let mut members = self.topics.entry(topic.to_string()).or_default();
        let inserted = members
            .insert(conn.id.clone(), Arc::clone(conn))
            .is_none();
        // Mirror update under the same entry lock
        let _ = conn.add_subscription(topic);
        inserted
    }

    /// Remove a connection from a topic, dropping the topic when emptied.
    ///
    /// Returns `false` if the connection was not a member.
    pub fn leave(&self, topic: &str, conn: &Arc<ConnectionHandle>) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(mut members) => {
                let removed = members.remove(&conn.id).is_some();
                let _ = conn.remove_subscription(topic);
                removed
            }
            None => false,
        };
        let _ = self.topics.remove_if(topic, |_, members| members.is_empty());
        removed
    }

    /// Remove a connection from every topic and from the registry.
    ///
    /// Completes before the connection may report `Closed`.
    pub fn leave_all(&self, conn: &Arc<ConnectionHandle>) {
        for topic in conn.take_subscriptions() {
            if let Some(mut members) = self.topics.get_mut(&topic) {
                let _ = members.remove(&conn.id);
            }
            let _ = self.topics.remove_if(&topic, |_, members| members.is_empty());
        }
        let _ = self.connections.remove(&conn.id);
    }

    /// Publish an event to every member of its topic.
    ///
    /// The envelope is serialized once; each member gets a non-blocking
    /// offer, so one slow consumer never delays the rest. Returns the
    /// number of connections the event was queued for.
    pub fn publish(&self, event: &Event) -> usize {
        let json: Arc<str> = match EventEnvelope::from(event).to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(topic = %event.topic, error = %e, "failed to serialize event");
                return 0;
            }
        };

        // Snapshot members so enqueue happens outside the entry lock.
        let members: Vec<Arc<ConnectionHandle>> = match self.topics.get(&event.topic) {
            Some(members) => members.values().cloned().collect(),
            None => return 0,
        };

        counter!(metric_names::EVENTS_PUBLISHED_TOTAL).increment(1);

        let mut delivered = 0;
        for conn in &members {
            match conn.enqueue(event, &json) {
                EnqueueOutcome::Queued => delivered += 1,
                EnqueueOutcome::QueuedEvictedOldest => {
                    delivered += 1;
                    counter!(metric_names::EVENTS_DROPPED_TOTAL).increment(1);
                }
                EnqueueOutcome::Filtered => {
                    counter!(metric_names::EVENTS_FILTERED_TOTAL).increment(1);
                }
                EnqueueOutcome::Closed => {}
            }
        }
        counter!(metric_names::EVENTS_DELIVERED_TOTAL).increment(delivered as u64);
        debug!(topic = %event.topic, kind = event.kind_name(), delivered, "published");
        delivered
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of topics with at least one member.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Number of members in a topic.
    pub fn member_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |members| members.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
