//! Wire protocol frames.
//!
//! All frames are JSON text. Client-to-server frames are control only;
//! server-to-client traffic is either a control reply ([`ServerFrame`]) or
//! an event envelope ([`EventEnvelope`]). [`parse_inbound`] distinguishes
//! the two on the client side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::event::{Event, EventKind};
use crate::filter::EventFilter;

/// Close code sent when authentication fails, distinguishable from a
/// normal close (application codes live in the 4000-4999 range).
pub const CLOSE_UNAUTHORIZED: u16 = 4401;

/// Frames a client may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Liveness probe; the server answers with `pong` immediately.
    Ping,
    /// Replace the connection's filter atomically.
    SetFilters {
        /// The new filter; an empty object passes everything.
        filters: EventFilter,
    },
    /// Join a topic.
    Subscribe {
        /// Topic name.
        topic: String,
    },
    /// Leave a topic.
    Unsubscribe {
        /// Topic name.
        topic: String,
    },
    /// Stop draining events to this connection (the queue keeps filling).
    Pause,
    /// Resume draining, oldest queued event first.
    Resume,
}

/// Control frames the server sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Reply to a client `ping`.
    Pong,
    /// Confirmation that the connection joined a topic.
    Connected {
        /// Topic name.
        topic: String,
    },
    /// Acknowledges a `set_filters` frame.
    FiltersUpdated,
    /// Acknowledges a `subscribe` frame.
    Subscribed {
        /// Topic name.
        topic: String,
    },
    /// Acknowledges an `unsubscribe` frame.
    Unsubscribed {
        /// Topic name.
        topic: String,
    },
    /// Acknowledges a `pause` frame.
    Paused,
    /// Acknowledges a `resume` frame.
    Resumed,
    /// A non-fatal protocol error (e.g. a malformed frame).
    Error {
        /// What went wrong.
        message: String,
    },
}

impl ServerFrame {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An event as delivered to viewers: the typed payload plus the publish
/// timestamp, without the topic (the connection knows what it joined).
///
/// Wire shape: `{"type": ..., "data": {...}, "timestamp": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The typed payload.
    #[serde(flatten)]
    pub kind: EventKind,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

impl From<&Event> for EventEnvelope {
    fn from(event: &Event) -> Self {
        Self {
            kind: event.kind.clone(),
            timestamp: event.published_at,
        }
    }
}

impl EventEnvelope {
    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Anything the server may send over the socket.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A control reply.
    Control(ServerFrame),
    /// An event envelope.
    Event(EventEnvelope),
}

/// Parse a text frame received from the server.
///
/// Control frames have a closed set of `type` tags; anything else is
/// treated as an event envelope.
pub fn parse_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    if let Ok(frame) = serde_json::from_str::<ServerFrame>(text) {
        return Ok(Inbound::Control(frame));
    }
    let envelope = serde_json::from_str::<EventEnvelope>(text)?;
    Ok(Inbound::Event(envelope))
}

/// Parse a text frame received from a client.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LogLevel, LogRecord, MetricSnapshot};
    use crate::ids::EventId;

    fn sample_event() -> Event {
        Event::now(
            "logs:stream",
            EventKind::LogEvent(LogRecord {
                id: EventId::from("log-1"),
                timestamp: Utc::now(),
                level: LogLevel::Info,
                message: "started".into(),
                source: None,
                service_name: None,
                environment: None,
                metadata: serde_json::Map::new(),
            }),
        )
    }

    #[test]
    fn client_ping_wire_shape() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping);
        let json = serde_json::to_value(&ClientFrame::Ping).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ping"}));
    }

    #[test]
    fn client_set_filters_wire_shape() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"set_filters","filters":{"level":"error"}}"#).unwrap();
        let ClientFrame::SetFilters { filters } = frame else {
            panic!("expected set_filters");
        };
        assert_eq!(filters.level, Some(LogLevel::Error));
    }

    #[test]
    fn client_subscribe_wire_shape() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","topic":"metrics:stream"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                topic: "metrics:stream".into()
            }
        );
    }

    #[test]
    fn malformed_client_frame_is_error() {
        assert!(parse_client_frame("not json").is_err());
        assert!(parse_client_frame(r#"{"type":"launch_missiles"}"#).is_err());
        assert!(parse_client_frame(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn server_pong_wire_shape() {
        let json = ServerFrame::Pong.to_json().unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn server_connected_wire_shape() {
        let json = ServerFrame::Connected {
            topic: "logs:stream".into(),
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["topic"], "logs:stream");
    }

    #[test]
    fn envelope_has_type_data_timestamp() {
        let event = sample_event();
        let envelope = EventEnvelope::from(&event);
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "log_event");
        assert_eq!(value["data"]["message"], "started");
        assert!(value["timestamp"].is_string());
        // The topic never appears on the wire
        assert!(value.get("topic").is_none());
    }

    #[test]
    fn envelope_roundtrip() {
        let event = sample_event();
        let envelope = EventEnvelope::from(&event);
        let json = envelope.to_json().unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn parse_inbound_control() {
        let inbound = parse_inbound(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(inbound, Inbound::Control(ServerFrame::Pong));

        let inbound = parse_inbound(r#"{"type":"connected","topic":"logs:stream"}"#).unwrap();
        assert!(matches!(inbound, Inbound::Control(ServerFrame::Connected { .. })));
    }

    #[test]
    fn parse_inbound_event() {
        let envelope = EventEnvelope {
            kind: EventKind::MetricTick(MetricSnapshot::default()),
            timestamp: Utc::now(),
        };
        let inbound = parse_inbound(&envelope.to_json().unwrap()).unwrap();
        let Inbound::Event(back) = inbound else {
            panic!("expected event");
        };
        assert_eq!(back.kind, envelope.kind);
    }

    #[test]
    fn parse_inbound_garbage_is_error() {
        assert!(parse_inbound("{{{").is_err());
        assert!(parse_inbound(r#"{"type":"mystery"}"#).is_err());
    }

    #[test]
    fn close_code_is_application_range() {
        assert!((4000..5000).contains(&CLOSE_UNAUTHORIZED));
    }
}
