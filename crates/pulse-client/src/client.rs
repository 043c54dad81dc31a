//! `WebSocket` stream client with automatic reconnect.
//!
//! The client owns the socket; stream state lives in the shared
//! [`StreamController`]. On every (re)connect it replays the controller's
//! filter and the configured extra topics, so a reconnected session looks
//! like the old one to the consumer. Reconnects back off exponentially
//! with jitter; an authentication close is fatal and is never retried.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pulse_core::backoff::ReconnectPolicy;
use pulse_core::protocol::{parse_inbound, ClientFrame, Inbound, ServerFrame};
use pulse_core::CLOSE_UNAUTHORIZED;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::controller::{ConnectionStatus, StreamController};

/// Errors that permanently stop the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server closed with the authentication close code.
    #[error("server rejected the token")]
    Unauthorized,
    /// Every reconnect attempt in the budget failed.
    #[error("reconnect budget exhausted after {0} attempts")]
    Exhausted(u32),
}

/// Connection settings for a stream client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Upgrade endpoint, e.g. `ws://127.0.0.1:8765/ws/logs`.
    pub url: String,
    /// Auth token sent as a query parameter.
    pub token: String,
    /// Topics joined on every connect, beyond the route defaults.
    pub extra_topics: Vec<String>,
    /// Reconnect schedule.
    pub policy: ReconnectPolicy,
}

impl ClientConfig {
    /// Config for `url` and `token` with default topics and policy.
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            extra_topics: Vec::new(),
            policy: ReconnectPolicy::default(),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one connected session, from the reconnect loop's view.
enum SessionEnd {
    /// Connection dropped or errored; retry.
    Lost,
    /// Server closed with the auth code; do not retry.
    Unauthorized,
    /// Shutdown was requested.
    Cancelled,
}

/// Keeps a stream connection alive and feeds the controller.
pub struct StreamClient {
    config: ClientConfig,
    controller: Arc<StreamController>,
}

impl StreamClient {
    /// Create a client feeding `controller`.
    #[must_use]
    pub fn new(config: ClientConfig, controller: Arc<StreamController>) -> Self {
        Self { config, controller }
    }

    fn endpoint(&self) -> String {
        let sep = if self.config.url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.config.url, sep, self.config.token)
    }

    /// Run until cancelled, unauthorized, or the reconnect budget runs
    /// out.
    #[instrument(skip_all, fields(url = %self.config.url))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ClientError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match connect_async(self.endpoint()).await {
                Ok((ws, _)) => {
                    info!("connected");
                    self.controller.set_status(ConnectionStatus::Live);
                    attempt = 0;
                    match self.run_session(ws, &cancel).await {
                        SessionEnd::Lost => {}
                        SessionEnd::Unauthorized => {
                            self.controller.set_status(ConnectionStatus::Disconnected);
                            return Err(ClientError::Unauthorized);
                        }
                        SessionEnd::Cancelled => return Ok(()),
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "connect failed");
                }
            }

            if self.config.policy.exhausted(attempt) {
                self.controller.set_status(ConnectionStatus::Disconnected);
                return Err(ClientError::Exhausted(attempt));
            }
            self.controller
                .set_status(ConnectionStatus::Reconnecting { attempt });
            let delay = self
                .config
                .policy
                .delay_ms_with_random(attempt, rand::random());
            debug!(attempt, delay_ms = delay, "waiting before reconnect");
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(delay)) => {}
                () = cancel.cancelled() => return Ok(()),
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// Replay session state, then pump frames until the socket ends.
    async fn run_session(&self, mut ws: WsStream, cancel: &CancellationToken) -> SessionEnd {
        if self.replay_state(&mut ws).await.is_err() {
            return SessionEnd::Lost;
        }

        loop {
            let msg = tokio::select! {
                msg = ws.next() => msg,
                () = cancel.cancelled() => {
                    let _ = ws.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
            };
            let msg = match msg {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    warn!(error = %e, "socket error");
                    return SessionEnd::Lost;
                }
                None => return SessionEnd::Lost,
            };
            match msg {
                Message::Text(text) => self.handle_text(&text),
                Message::Ping(payload) => {
                    if ws.send(Message::Pong(payload)).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                Message::Close(frame) => {
                    if frame
                        .as_ref()
                        .is_some_and(|f| f.code == CloseCode::Library(CLOSE_UNAUTHORIZED))
                    {
                        warn!("closed unauthorized");
                        return SessionEnd::Unauthorized;
                    }
                    info!("server closed connection");
                    return SessionEnd::Lost;
                }
                Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Resend the current filter and extra topic subscriptions.
    async fn replay_state(
        &self,
        ws: &mut WsStream,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let filter = self.controller.filter();
        if !filter.is_empty() {
            self.send_frame(ws, &ClientFrame::SetFilters { filters: filter })
                .await?;
        }
        for topic in &self.config.extra_topics {
            self.send_frame(
                ws,
                &ClientFrame::Subscribe {
                    topic: topic.clone(),
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn send_frame(
        &self,
        ws: &mut WsStream,
        frame: &ClientFrame,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let json = serde_json::to_string(frame).unwrap_or_default();
        ws.send(Message::Text(json.into())).await
    }

    fn handle_text(&self, text: &str) {
        match parse_inbound(text) {
            Ok(Inbound::Event(envelope)) => self.controller.ingest(envelope),
            Ok(Inbound::Control(ServerFrame::Error { message })) => {
                warn!(%message, "server reported an error");
            }
            Ok(Inbound::Control(frame)) => debug!(?frame, "control reply"),
            Err(e) => warn!(error = %e, "unparseable frame"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::event::{EventKind, LogLevel, LogRecord};
    use pulse_core::protocol::EventEnvelope;
    use pulse_core::{EventFilter, EventId};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: 10,
            max_delay_ms: 50,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    fn envelope_json(message: &str) -> String {
        EventEnvelope {
            kind: EventKind::LogEvent(LogRecord {
                id: EventId::new(),
                timestamp: Utc::now(),
                level: LogLevel::Info,
                message: message.into(),
                source: None,
                service_name: None,
                environment: None,
                metadata: serde_json::Map::new(),
            }),
            timestamp: Utc::now(),
        }
        .to_json()
        .unwrap()
    }

    async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
        while !check() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn events_flow_into_controller() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(envelope_json("from server").into()))
                .await
                .unwrap();
            // Hold the connection open until the test ends
            let _ = ws.next().await;
        });

        let controller = Arc::new(StreamController::new(10));
        let client = StreamClient::new(
            ClientConfig::new(format!("ws://{addr}/ws/logs"), "secret"),
            controller.clone(),
        );
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        wait_until(2000, || controller.buffered_len() == 1).await;
        assert_eq!(controller.status(), ConnectionStatus::Live);

        cancel.cancel();
        run.await.unwrap().unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn replays_filter_and_subscriptions_on_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut frames = Vec::new();
            for _ in 0..2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    frames.push(text.to_string());
                }
            }
            frames
        });

        let controller = Arc::new(StreamController::new(10));
        controller.set_filter(EventFilter {
            level: Some(LogLevel::Error),
            ..EventFilter::default()
        });
        let mut config = ClientConfig::new(format!("ws://{addr}/ws/logs"), "secret");
        config.extra_topics = vec!["metrics:stream".to_string()];
        let client = StreamClient::new(config, controller);

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        let frames = server.await.unwrap();
        assert!(frames[0].contains("set_filters"));
        assert!(frames[0].contains("error"));
        assert!(frames[1].contains("subscribe"));
        assert!(frames[1].contains("metrics:stream"));

        cancel.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // First session drops straight away
            let (stream, _) = listener.accept().await.unwrap();
            drop(accept_async(stream).await.unwrap());
            // Second session delivers an event
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(envelope_json("after reconnect").into()))
                .await
                .unwrap();
            let _ = ws.next().await;
        });

        let controller = Arc::new(StreamController::new(10));
        let mut config = ClientConfig::new(format!("ws://{addr}/ws/logs"), "secret");
        config.policy = fast_policy(5);
        let client = StreamClient::new(config, controller.clone());

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        wait_until(3000, || controller.buffered_len() == 1).await;
        assert_eq!(controller.status(), ConnectionStatus::Live);

        cancel.cancel();
        run.await.unwrap().unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn gives_up_after_reconnect_budget() {
        // Bind then drop so the port refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let controller = Arc::new(StreamController::new(10));
        let mut config = ClientConfig::new(format!("ws://{addr}/ws/logs"), "secret");
        config.policy = fast_policy(2);
        let client = StreamClient::new(config, controller.clone());

        let err = client.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Exhausted(2)));
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn unauthorized_close_is_fatal() {
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Library(CLOSE_UNAUTHORIZED),
                reason: "unauthorized".into(),
            })))
            .await
            .unwrap();
        });

        let controller = Arc::new(StreamController::new(10));
        let mut config = ClientConfig::new(format!("ws://{addr}/ws/logs"), "bad-token");
        config.policy = fast_policy(5);
        let client = StreamClient::new(config, controller.clone());

        let err = client.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized));
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);
        server.await.unwrap();
    }

    #[test]
    fn endpoint_appends_token() {
        let controller = Arc::new(StreamController::new(1));
        let client = StreamClient::new(
            ClientConfig::new("ws://host/ws/logs", "tok"),
            controller.clone(),
        );
        assert_eq!(client.endpoint(), "ws://host/ws/logs?token=tok");

        let client = StreamClient::new(
            ClientConfig::new("ws://host/ws/logs?topics=a", "tok"),
            controller,
        );
        assert_eq!(client.endpoint(), "ws://host/ws/logs?topics=a&token=tok");
    }
}
