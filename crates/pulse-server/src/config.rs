//! Server configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::topics;

/// Configuration for the Pulse server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after this long without a pong).
    pub heartbeat_timeout_secs: u64,
    /// Per-connection outbound queue capacity; a full queue evicts oldest.
    pub outbound_queue_capacity: usize,
    /// Broker channel → topic routing.
    pub broker_routes: HashMap<String, String>,
    /// Base delay for broker reconnect backoff in ms.
    pub bridge_base_delay_ms: u64,
    /// Maximum delay for broker reconnect backoff in ms.
    pub bridge_max_delay_ms: u64,
    /// How often to publish a `metric_tick`, in seconds.
    pub metrics_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut broker_routes = HashMap::new();
        let _ = broker_routes.insert(
            topics::CHANNEL_LOGS_REALTIME.to_string(),
            topics::TOPIC_LOGS.to_string(),
        );
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            outbound_queue_capacity: 256,
            broker_routes,
            bridge_base_delay_ms: 1000,
            bridge_max_delay_ms: 30_000,
            metrics_interval_secs: 1,
        }
    }
}
