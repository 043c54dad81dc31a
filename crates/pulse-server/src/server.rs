//! `PulseServer` — Axum HTTP + `WebSocket` server.
//!
//! Three upgrade routes share one handler: `/ws/logs`, `/ws/metrics` and
//! `/ws/notifications` differ only in their default topic set. Auth and
//! the connection cap are checked before the upgrade completes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use pulse_core::{ConnectionId, CLOSE_UNAUTHORIZED};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics as metric_names;
use crate::shutdown::ShutdownCoordinator;
use crate::topics;
use crate::websocket::connection::ConnectionHandle;
use crate::websocket::registry::TopicRegistry;
use crate::websocket::session::{run_ws_session, SessionTiming};

/// Errors from starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind or inspect the listen socket.
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Topic membership and fan-out.
    pub registry: Arc<TopicRegistry>,
    /// Token validator applied at upgrade time.
    pub validator: Arc<dyn TokenValidator>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus render handle, when metrics are installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

/// The main event distribution server.
pub struct PulseServer {
    config: Arc<ServerConfig>,
    registry: Arc<TopicRegistry>,
    validator: Arc<dyn TokenValidator>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl PulseServer {
    /// Create a new server sharing `registry` with the broker bridge.
    pub fn new(
        config: ServerConfig,
        registry: Arc<TopicRegistry>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            validator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Attach a Prometheus handle so `/metrics` renders real output.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            validator: self.validator.clone(),
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/logs", get(ws_logs_handler))
            .route("/ws/metrics", get(ws_metrics_handler))
            .route("/ws/notifications", get(ws_notifications_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve, returning the bound address and the serve task.
    ///
    /// The task exits after the shutdown coordinator fires and in-flight
    /// requests drain.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server exited with error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the topic registry.
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Query parameters accepted by the upgrade routes.
#[derive(Debug, Deserialize)]
struct WsQuery {
    /// Auth token. Missing or empty rejects with close code 4401.
    token: Option<String>,
    /// Extra topics to join at connect, comma-separated.
    topics: Option<String>,
}

/// Which upgrade route the client hit; decides the default topics.
#[derive(Clone, Copy, Debug)]
enum WsRoute {
    Logs,
    Metrics,
    Notifications,
}

impl WsRoute {
    fn default_topics(self, user_id: &str) -> Vec<String> {
        match self {
            Self::Logs => vec![topics::TOPIC_LOGS.to_string()],
            Self::Metrics => vec![topics::TOPIC_METRICS.to_string()],
            Self::Notifications => vec![
                topics::notifications_topic(user_id),
                topics::TOPIC_NOTIFICATIONS_BROADCAST.to_string(),
            ],
        }
    }
}

/// Merge route defaults with the `topics` query parameter, deduplicated.
fn requested_topics(defaults: Vec<String>, extra: Option<&str>) -> Vec<String> {
    let mut merged = defaults;
    if let Some(extra) = extra {
        for topic in extra.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !merged.iter().any(|t| t == topic) {
                merged.push(topic.to_string());
            }
        }
    }
    merged
}

async fn ws_logs_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    handle_upgrade(WsRoute::Logs, ws, query, state).await
}

async fn ws_metrics_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    handle_upgrade(WsRoute::Metrics, ws, query, state).await
}

async fn ws_notifications_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    handle_upgrade(WsRoute::Notifications, ws, query, state).await
}

/// Shared upgrade path: capacity check, then auth, then session.
async fn handle_upgrade(
    route: WsRoute,
    ws: WebSocketUpgrade,
    query: WsQuery,
    state: AppState,
) -> Response {
    if state.registry.connection_count() >= state.config.max_connections {
        warn!(max = state.config.max_connections, "connection cap reached");
        counter!(metric_names::WS_REJECTIONS_TOTAL, "reason" => "capacity").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let token = query.token.as_deref().unwrap_or("");
    let identity = match state.validator.validate(token).await {
        Ok(identity) => identity,
        Err(e) => {
            info!(?route, error = %e, "rejecting unauthenticated upgrade");
            counter!(metric_names::WS_REJECTIONS_TOTAL, "reason" => "auth").increment(1);
            // Complete the upgrade so the client sees the close code
            // instead of a bare HTTP error.
            return ws.on_upgrade(close_unauthorized);
        }
    };

    let initial_topics = requested_topics(
        route.default_topics(&identity.user_id),
        query.topics.as_deref(),
    );
    let conn = Arc::new(ConnectionHandle::new(
        ConnectionId::new(),
        Some(identity.user_id),
        state.config.outbound_queue_capacity,
    ));
    let timing = SessionTiming {
        ping_interval: Duration::from_secs(state.config.heartbeat_interval_secs),
        pong_timeout: Duration::from_secs(state.config.heartbeat_timeout_secs),
    };
    let registry = state.registry.clone();
    let cancel = state.shutdown.token();
    ws.on_upgrade(move |socket| {
        run_ws_session(socket, conn, registry, initial_topics, timing, cancel)
    })
}

/// Send close code 4401 and hang up.
async fn close_unauthorized(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHORIZED,
            reason: "unauthorized".into(),
        })))
        .await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.topic_count(),
    );
    Json(resp)
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(crate::metrics::render)
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
