//! Well-known topic and broker channel names.

/// Live log lines.
pub const TOPIC_LOGS: &str = "logs:stream";
/// Periodic aggregate statistics.
pub const TOPIC_METRICS: &str = "metrics:stream";
/// Notifications addressed to every connected user.
pub const TOPIC_NOTIFICATIONS_BROADCAST: &str = "notifications:broadcast";

/// Broker channel the log ingestion pipeline publishes to.
pub const CHANNEL_LOGS_REALTIME: &str = "logs:realtime";

/// Per-user notification topic.
#[must_use]
pub fn notifications_topic(user_id: &str) -> String {
    format!("notifications:{user_id}")
}
