//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Rejected upgrade attempts total (counter, labels: reason).
pub const WS_REJECTIONS_TOTAL: &str = "ws_rejections_total";
/// Events published to topics total (counter).
pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
/// Events queued for delivery total (counter).
pub const EVENTS_DELIVERED_TOTAL: &str = "events_delivered_total";
/// Events evicted from full subscriber queues total (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "events_dropped_total";
/// Events suppressed by subscriber filters total (counter).
pub const EVENTS_FILTERED_TOTAL: &str = "events_filtered_total";
/// Raw broker messages consumed total (counter).
pub const BROKER_MESSAGES_TOTAL: &str = "broker_messages_total";
/// Broker resubscriptions after failure total (counter).
pub const BROKER_RECONNECTS_TOTAL: &str = "broker_reconnects_total";
