//! Event model — everything that flows through a topic.
//!
//! An [`Event`] pairs a topic with an [`EventKind`] payload and a publish
//! timestamp. The kind enum serializes adjacently tagged so the wire shape
//! is `{"type": "log_event", "data": {...}}`, which viewers switch on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;

/// A single event published to a topic.
///
/// Events are immutable after construction. The registry serializes an
/// event once per publish and shares the resulting JSON across all
/// subscriber queues.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic this event belongs to (e.g. `logs:stream`).
    pub topic: String,
    /// The typed payload.
    #[serde(flatten)]
    pub kind: EventKind,
    /// When the event entered the system.
    pub published_at: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn now(topic: impl Into<String>, kind: EventKind) -> Self {
        Self {
            topic: topic.into(),
            kind,
            published_at: Utc::now(),
        }
    }

    /// Short type tag, used in logs and metrics labels.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }
}

/// The typed event payload.
///
/// Wire shape: `{"type": "<snake_case variant>", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    /// A log line from the ingestion pipeline.
    LogEvent(LogRecord),
    /// Periodic aggregate statistics.
    MetricTick(MetricSnapshot),
    /// A raised alert (e.g. derived from an error-level log).
    Alert(AlertPayload),
    /// A user-facing notification.
    Notification(NotificationPayload),
    /// Progress of a bulk log upload.
    UploadStatus(UploadStatusPayload),
}

impl EventKind {
    /// The snake_case tag as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogEvent(_) => "log_event",
            Self::MetricTick(_) => "metric_tick",
            Self::Alert(_) => "alert",
            Self::Notification(_) => "notification",
            Self::UploadStatus(_) => "upload_status",
        }
    }
}

/// Severity of a log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Routine information.
    Info,
    /// Something unexpected but recoverable.
    Warning,
    /// An operation failed.
    Error,
    /// The system is in serious trouble.
    Critical,
}

impl LogLevel {
    /// Parse a level string leniently: case-insensitive, unknown values
    /// (including `warn`/`err`/`fatal` shorthands) map to sensible levels,
    /// anything unrecognized becomes `Info`.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warning" | "warn" => Self::Warning,
            "error" | "err" => Self::Error,
            "critical" | "fatal" => Self::Critical,
            _ => Self::Info,
        }
    }

    /// Lowercase name as it appears on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized log line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Stable identifier (assigned at ingestion if the source had none).
    pub id: EventId,
    /// When the line was emitted.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// The log message itself.
    pub message: String,
    /// Emitting host or shipper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Logical service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Deployment environment (e.g. `production`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Extra structured fields carried through unmodified.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Aggregate statistics over the recent event stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Log throughput over the last 10 seconds.
    pub logs_per_second: f64,
    /// Error-level lines in the last minute.
    pub errors_per_minute: u64,
    /// Warning-level lines in the last minute.
    pub warnings_per_minute: u64,
    /// Critical-level lines in the last minute.
    pub criticals_per_minute: u64,
    /// Per-level counts over the last minute.
    #[serde(default)]
    pub level_distribution: std::collections::BTreeMap<String, u64>,
    /// Most active sources over the last minute, descending.
    #[serde(default)]
    pub top_sources: Vec<SourceCount>,
    /// Currently connected viewers.
    pub connected_clients: usize,
}

/// A source name with its recent event count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    /// Source host or shipper name.
    pub source: String,
    /// Events seen from this source in the window.
    pub count: u64,
}

/// Alert severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Needs attention soon.
    High,
    /// Needs attention now.
    Critical,
}

/// A raised alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Alert identifier.
    pub id: EventId,
    /// How urgent this is.
    pub severity: AlertSeverity,
    /// Human-readable description.
    pub message: String,
    /// Source that triggered the alert, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A user-facing notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Notification identifier.
    pub id: EventId,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub body: String,
}

/// Lifecycle state of a bulk upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Waiting to be processed.
    Queued,
    /// Currently being parsed.
    Processing,
    /// Finished successfully.
    Completed,
    /// Aborted with an error.
    Failed,
}

/// Progress of a bulk log upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadStatusPayload {
    /// Upload identifier.
    pub upload_id: String,
    /// Current lifecycle state.
    pub state: UploadState,
    /// Fraction complete in `[0, 1]`, when the parser can estimate it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Error detail for failed uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord {
            id: EventId::from("log-1"),
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: "disk full".into(),
            source: Some("web-01".into()),
            service_name: Some("api".into()),
            environment: Some("production".into()),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn kind_serializes_adjacently_tagged() {
        let kind = EventKind::LogEvent(sample_record());
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "log_event");
        assert_eq!(value["data"]["message"], "disk full");
        assert_eq!(value["data"]["level"], "error");
    }

    #[test]
    fn kind_name_matches_wire_tag() {
        let kind = EventKind::LogEvent(sample_record());
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], kind.name());
    }

    #[test]
    fn event_now_stamps_topic_and_time() {
        let event = Event::now("logs:stream", EventKind::LogEvent(sample_record()));
        assert_eq!(event.topic, "logs:stream");
        assert_eq!(event.kind_name(), "log_event");
    }

    #[test]
    fn log_level_parse_lossy() {
        assert_eq!(LogLevel::parse_lossy("ERROR"), LogLevel::Error);
        assert_eq!(LogLevel::parse_lossy("warn"), LogLevel::Warning);
        assert_eq!(LogLevel::parse_lossy("Warning"), LogLevel::Warning);
        assert_eq!(LogLevel::parse_lossy("fatal"), LogLevel::Critical);
        assert_eq!(LogLevel::parse_lossy("trace"), LogLevel::Debug);
        assert_eq!(LogLevel::parse_lossy("nonsense"), LogLevel::Info);
        assert_eq!(LogLevel::parse_lossy(""), LogLevel::Info);
    }

    #[test]
    fn log_level_display_is_lowercase() {
        assert_eq!(LogLevel::Critical.to_string(), "critical");
        assert_eq!(format!("{}", LogLevel::Warning), "warning");
    }

    #[test]
    fn log_record_optional_fields_omitted() {
        let record = LogRecord {
            source: None,
            service_name: None,
            environment: None,
            ..sample_record()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("source").is_none());
        assert!(value.get("service_name").is_none());
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn log_record_roundtrip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();
        let back: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn metric_tick_roundtrip() {
        let mut dist = std::collections::BTreeMap::new();
        let _ = dist.insert("error".to_string(), 3);
        let snapshot = MetricSnapshot {
            logs_per_second: 12.5,
            errors_per_minute: 3,
            warnings_per_minute: 7,
            criticals_per_minute: 0,
            level_distribution: dist,
            top_sources: vec![SourceCount {
                source: "web-01".into(),
                count: 42,
            }],
            connected_clients: 4,
        };
        let kind = EventKind::MetricTick(snapshot.clone());
        let json = serde_json::to_string(&kind).unwrap();
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::MetricTick(snapshot));
    }

    #[test]
    fn alert_severity_lowercase() {
        let alert = AlertPayload {
            id: EventId::from("a-1"),
            severity: AlertSeverity::Critical,
            message: "db down".into(),
            source: None,
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["severity"], "critical");
    }

    #[test]
    fn upload_status_roundtrip() {
        let kind = EventKind::UploadStatus(UploadStatusPayload {
            upload_id: "up-9".into(),
            state: UploadState::Processing,
            progress: Some(0.25),
            detail: None,
        });
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "upload_status");
        assert_eq!(value["data"]["state"], "processing");
        let back: EventKind = serde_json::from_value(value).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn all_kind_names_are_snake_case() {
        let kinds = [
            EventKind::LogEvent(sample_record()),
            EventKind::MetricTick(MetricSnapshot::default()),
            EventKind::Alert(AlertPayload {
                id: EventId::new(),
                severity: AlertSeverity::High,
                message: "m".into(),
                source: None,
            }),
            EventKind::Notification(NotificationPayload {
                id: EventId::new(),
                title: "t".into(),
                body: "b".into(),
            }),
            EventKind::UploadStatus(UploadStatusPayload {
                upload_id: "u".into(),
                state: UploadState::Queued,
                progress: None,
                detail: None,
            }),
        ];
        for kind in kinds {
            assert!(
                kind.name()
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c == '_'),
                "kind name '{}' must be snake_case",
                kind.name()
            );
        }
    }
}
