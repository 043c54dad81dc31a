//! Broker bridge — consumes the external broker and publishes typed
//! events into the topic registry.
//!
//! One bridge task per process, which is what gives each topic its FIFO
//! ordering. When the broker is unreachable the bridge retries with
//! exponential backoff and no replay: events raised during the gap are
//! lost, by contract.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use metrics::counter;
use pulse_core::backoff::calculate_backoff_delay;
use pulse_core::event::{AlertPayload, AlertSeverity, EventKind, LogLevel, LogRecord};
use pulse_core::{Event, EventId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broker::BrokerSource;
use crate::metrics as metric_names;
use crate::stats::LiveStats;
use crate::topics;
use crate::websocket::registry::TopicRegistry;

/// Alert messages derived from logs are truncated to this many characters.
const ALERT_MESSAGE_MAX: usize = 200;

/// Bridges broker messages to WebSocket viewers.
pub struct BrokerBridge {
    source: Arc<dyn BrokerSource>,
    registry: Arc<TopicRegistry>,
    stats: Arc<LiveStats>,
    routes: HashMap<String, String>,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl BrokerBridge {
    /// Create a bridge with a channel → topic routing table.
    #[must_use]
    pub fn new(
        source: Arc<dyn BrokerSource>,
        registry: Arc<TopicRegistry>,
        stats: Arc<LiveStats>,
        routes: HashMap<String, String>,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Self {
        Self {
            source,
            registry,
            stats,
            routes,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Run until cancelled. Resubscribes with exponential backoff when the
    /// broker stream fails or ends; the delay resets after each successful
    /// subscribe.
    #[instrument(skip_all, name = "broker_bridge")]
    pub async fn run(self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let mut stream = match self.source.subscribe().await {
                Ok(stream) => {
                    if attempt > 0 {
                        info!(attempt, "broker resubscribed");
                        counter!(metric_names::BROKER_RECONNECTS_TOTAL).increment(1);
                    }
                    attempt = 0;
                    stream
                }
                Err(e) => {
                    let delay = calculate_backoff_delay(attempt, self.base_delay_ms, self.max_delay_ms);
                    warn!(error = %e, attempt, delay_ms = delay, "broker unavailable, retrying");
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        () = tokio::time::sleep(std::time::Duration::from_millis(delay)) => continue,
                        () = cancel.cancelled() => break,
                    }
                }
            };

            loop {
                let msg = tokio::select! {
                    msg = stream.next() => msg,
                    () = cancel.cancelled() => return,
                };
                let Some(msg) = msg else {
                    warn!("broker stream ended, resubscribing");
                    break;
                };
                counter!(metric_names::BROKER_MESSAGES_TOTAL).increment(1);
                self.dispatch(&msg.channel, &msg.body);
            }
        }
        info!("broker bridge stopped");
    }

    /// Route one raw broker message into the registry.
    fn dispatch(&self, channel: &str, body: &str) {
        let Some(topic) = self.routes.get(channel) else {
            debug!(channel, "no route for channel, skipping");
            return;
        };

        let raw: Value = match serde_json::from_str(body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(channel, error = %e, "malformed broker payload, skipping");
                return;
            }
        };

        let record = normalize_log(&raw);
        self.stats.record(&record);

        // Error-grade logs also raise an alert on the broadcast topic.
        if matches!(record.level, LogLevel::Error | LogLevel::Critical) {
            let alert = derive_alert(&record);
            let _ = self.registry.publish(&Event::now(
                topics::TOPIC_NOTIFICATIONS_BROADCAST,
                EventKind::Alert(alert),
            ));
        }

        let _ = self
            .registry
            .publish(&Event::now(topic.clone(), EventKind::LogEvent(record)));
    }
}

/// Normalize a raw ingestion payload into a [`LogRecord`].
///
/// Shippers wrap the interesting fields in a nested `parsed` object
/// (Logstash style); fields found there win over top-level ones. Level
/// parses leniently, missing timestamps fall back to now, and an `id` is
/// assigned when the source had none.
#[must_use]
pub fn normalize_log(raw: &Value) -> LogRecord {
    let parsed = raw.get("parsed").and_then(Value::as_object);
    let field = |key: &str| -> Option<&Value> {
        parsed
            .and_then(|p| p.get(key))
            .or_else(|| raw.get(key))
    };
    let str_field = |key: &str| field(key).and_then(Value::as_str);

    let level = str_field("level")
        .or_else(|| str_field("log_level"))
        .map_or(LogLevel::Info, LogLevel::parse_lossy);

    let timestamp = str_field("timestamp")
        .or_else(|| str_field("@timestamp"))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

    let mut metadata = serde_json::Map::new();
    if let Some(extra) = field("metadata").and_then(Value::as_object) {
        metadata = extra.clone();
    }

    LogRecord {
        id: str_field("id")
            .map_or_else(EventId::new, EventId::from),
        timestamp,
        level,
        message: str_field("message").unwrap_or_default().to_string(),
        source: str_field("source")
            .or_else(|| str_field("host"))
            .map(ToString::to_string),
        service_name: str_field("service_name").map(ToString::to_string),
        environment: str_field("environment").map(ToString::to_string),
        metadata,
    }
}

/// Build the alert raised by an error- or critical-level log.
#[must_use]
pub fn derive_alert(record: &LogRecord) -> AlertPayload {
    let severity = if record.level == LogLevel::Critical {
        AlertSeverity::Critical
    } else {
        AlertSeverity::High
    };
    let source = record.source.as_deref().unwrap_or("unknown");
    let message = truncate_chars(
        &format!("{} log from {}: {}", record.level, source, record.message),
        ALERT_MESSAGE_MAX,
    );
    AlertPayload {
        id: EventId::new(),
        severity,
        message,
        source: record.source.clone(),
    }
}

/// Truncate to at most `max` characters without splitting a code point.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
