//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use pulse_core::protocol::{parse_client_frame, ClientFrame, ServerFrame};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ConnectionHandle;
use super::registry::TopicRegistry;
use crate::metrics as metric_names;

/// Timing knobs for a session, derived from `ServerConfig`.
#[derive(Clone, Copy, Debug)]
pub struct SessionTiming {
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// How long to wait for a Pong before considering the client dead.
    pub pong_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Run a WebSocket session for an authenticated client.
///
/// 1. Joins the initial topics and sends a `connected` frame per topic
/// 2. Drains the connection's outbound queue to the socket, interleaved
///    with control replies and periodic Ping frames
/// 3. Dispatches incoming control frames (`ping`, `set_filters`,
///    `subscribe`/`unsubscribe`, `pause`/`resume`)
/// 4. Tears down on close/error/unresponsiveness: leaves every topic
///    before the connection reports closed
#[instrument(skip_all, fields(conn_id = %conn.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn: Arc<ConnectionHandle>,
    registry: Arc<TopicRegistry>,
    initial_topics: Vec<String>,
    timing: SessionTiming,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    info!(user_id = ?conn.user_id, "client connected");
    counter!(metric_names::WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(metric_names::WS_CONNECTIONS_ACTIVE).increment(1.0);

    registry.register(conn.clone());
    for topic in &initial_topics {
        let _ = registry.join(topic, &conn);
        if let Ok(json) = (ServerFrame::Connected {
            topic: topic.clone(),
        })
        .to_json()
        {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    }

    // Control replies bypass the event queue so a paused connection still
    // answers pings.
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(64);

    // Child token so the outbound task can tear down the read half too.
    // Dropping the sink alone leaves the read half parked on the socket
    // and the connection would never deregister.
    let session_cancel = cancel.child_token();

    let outbound_conn = conn.clone();
    let outbound_cancel = session_cancel.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(timing.ping_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                // Replies are polled before the event queue so a resume
                // ack reaches the wire ahead of the events it releases.
                biased;

                () = outbound_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                reply = reply_rx.recv() => {
                    match reply {
                        Some(json) => {
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > timing.pong_timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", timing.pong_timeout);
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                msg = outbound_conn.next_outbound() => {
                    match msg {
                        Some(json) => {
                            if ws_tx.send(Message::Text(json.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        // Unpark the read half so teardown always runs.
        outbound_cancel.cancel();
    });

    // Process incoming frames until close, error, unresponsiveness, or
    // shutdown.
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = session_cancel.cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(ref t) => {
                conn.mark_alive();
                Some(t.to_string())
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                conn.mark_alive();
                None
            }
            Message::Binary(_) => None,
        };
        let Some(text) = text else { continue };

        let reply = match parse_client_frame(&text) {
            Ok(frame) => handle_frame(frame, &conn, &registry),
            Err(e) => {
                warn!(error = %e, "malformed client frame");
                Some(ServerFrame::Error {
                    message: "malformed frame".into(),
                })
            }
        };
        if let Some(reply) = reply {
            let resumed = matches!(reply, ServerFrame::Resumed);
            match reply.to_json() {
                Ok(json) => {
                    if reply_tx.send(json).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize reply"),
            }
            // Reopen the drain only once the ack is queued, so the ack
            // precedes the events it releases.
            if resumed {
                conn.resume();
            }
        }
    }

    // Teardown: leave every topic before reporting closed.
    conn.close();
    registry.leave_all(&conn);
    conn.mark_closed();

    info!(
        dropped = conn.dropped_count(),
        filtered = conn.filtered_count(),
        "client disconnected"
    );
    counter!(metric_names::WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(metric_names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(metric_names::WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
    outbound.abort();
}

/// Apply a control frame, returning the acknowledgement to send.
///
/// `resume` is the exception: the session loop reopens the drain itself
/// after queueing the ack, so the ack is never overtaken by released
/// events.
fn handle_frame(
    frame: ClientFrame,
    conn: &Arc<ConnectionHandle>,
    registry: &Arc<TopicRegistry>,
) -> Option<ServerFrame> {
    match frame {
        ClientFrame::Ping => Some(ServerFrame::Pong),
        ClientFrame::SetFilters { filters } => {
            debug!(?filters, "filter replaced");
            conn.set_filter(filters);
            Some(ServerFrame::FiltersUpdated)
        }
        ClientFrame::Subscribe { topic } => {
            let _ = registry.join(&topic, conn);
            Some(ServerFrame::Subscribed { topic })
        }
        ClientFrame::Unsubscribe { topic } => {
            let _ = registry.leave(&topic, conn);
            Some(ServerFrame::Unsubscribed { topic })
        }
        ClientFrame::Pause => {
            conn.pause();
            Some(ServerFrame::Paused)
        }
        ClientFrame::Resume => Some(ServerFrame::Resumed),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    // Full socket sessions are covered by tests/integration.rs; unit tests
    // here exercise the frame dispatch helper.

    use super::*;
    use pulse_core::event::LogLevel;
    use pulse_core::{ConnectionId, EventFilter};

    fn setup() -> (Arc<ConnectionHandle>, Arc<TopicRegistry>) {
        let conn = Arc::new(ConnectionHandle::new(
            ConnectionId::from("c1"),
            Some("u-1".into()),
            16,
        ));
        let registry = Arc::new(TopicRegistry::new());
        registry.register(conn.clone());
        (conn, registry)
    }

    #[test]
    fn ping_returns_pong() {
        let (conn, registry) = setup();
        let reply = handle_frame(ClientFrame::Ping, &conn, &registry);
        assert_eq!(reply, Some(ServerFrame::Pong));
    }

    #[test]
    fn set_filters_replaces_and_acks() {
        let (conn, registry) = setup();
        let filters = EventFilter {
            level: Some(LogLevel::Error),
            ..EventFilter::default()
        };
        let reply = handle_frame(
            ClientFrame::SetFilters {
                filters: filters.clone(),
            },
            &conn,
            &registry,
        );
        assert_eq!(reply, Some(ServerFrame::FiltersUpdated));
        assert_eq!(conn.filter(), filters);
    }

    #[test]
    fn subscribe_joins_topic() {
        let (conn, registry) = setup();
        let reply = handle_frame(
            ClientFrame::Subscribe {
                topic: "metrics:stream".into(),
            },
            &conn,
            &registry,
        );
        assert_eq!(
            reply,
            Some(ServerFrame::Subscribed {
                topic: "metrics:stream".into()
            })
        );
        assert_eq!(registry.member_count("metrics:stream"), 1);
    }

    #[test]
    fn unsubscribe_leaves_topic() {
        let (conn, registry) = setup();
        let _ = registry.join("metrics:stream", &conn);
        let reply = handle_frame(
            ClientFrame::Unsubscribe {
                topic: "metrics:stream".into(),
            },
            &conn,
            &registry,
        );
        assert_eq!(
            reply,
            Some(ServerFrame::Unsubscribed {
                topic: "metrics:stream".into()
            })
        );
        assert_eq!(registry.member_count("metrics:stream"), 0);
    }

    #[test]
    fn pause_and_resume_acks() {
        let (conn, registry) = setup();
        assert_eq!(
            handle_frame(ClientFrame::Pause, &conn, &registry),
            Some(ServerFrame::Paused)
        );
        assert!(conn.is_paused());
        // The drain stays shut until the session loop has queued the ack.
        assert_eq!(
            handle_frame(ClientFrame::Resume, &conn, &registry),
            Some(ServerFrame::Resumed)
        );
        assert!(conn.is_paused());
    }

    #[test]
    fn default_timing() {
        let timing = SessionTiming::default();
        assert_eq!(timing.ping_interval, Duration::from_secs(30));
        assert_eq!(timing.pong_timeout, Duration::from_secs(60));
    }
}
