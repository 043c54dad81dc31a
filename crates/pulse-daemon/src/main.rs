//! # pulse-daemon
//!
//! Event distribution server binary — wires the broker bridge, topic
//! registry, live stats and the HTTP/`WebSocket` server together.

#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_core::event::LogLevel;
use pulse_server::auth::StaticTokenValidator;
use pulse_server::bridge::BrokerBridge;
use pulse_server::broker::{BrokerPublisher, ChannelBroker};
use pulse_server::config::ServerConfig;
use pulse_server::server::PulseServer;
use pulse_server::stats::{run_metrics_loop, LiveStats};
use pulse_server::topics;
use pulse_server::websocket::registry::TopicRegistry;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Pulse event distribution server.
#[derive(Parser, Debug)]
#[command(name = "pulse-daemon", about = "Real-time event distribution server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Maximum concurrent WebSocket connections.
    #[arg(long, default_value = "500")]
    max_connections: usize,

    /// Accepted tokens as `token:user_id` pairs (repeatable).
    #[arg(long = "token", value_parser = parse_token_spec)]
    tokens: Vec<(String, String)>,

    /// Publish synthetic logs to the broker for local development.
    #[arg(long)]
    demo: bool,
}

/// Parse a `token:user_id` pair.
fn parse_token_spec(spec: &str) -> std::result::Result<(String, String), String> {
    match spec.split_once(':') {
        Some((token, user)) if !token.is_empty() && !user.is_empty() => {
            Ok((token.to_string(), user.to_string()))
        }
        _ => Err(format!("expected token:user_id, got '{spec}'")),
    }
}

/// Publish a synthetic log line to the broker every 250ms.
async fn run_demo_publisher(publisher: BrokerPublisher, cancel: CancellationToken) {
    const SOURCES: [&str; 4] = ["web-01", "web-02", "worker-01", "db-01"];
    const LEVELS: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
    ];
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let mut n: u64 = 0;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let source = SOURCES[rand::random_range(0..SOURCES.len())];
                let level = LEVELS[rand::random_range(0..LEVELS.len())];
                let body = serde_json::json!({
                    "level": level.as_str(),
                    "message": format!("synthetic log line {n}"),
                    "source": source,
                    "service_name": "demo",
                    "environment": "development",
                });
                let _ = publisher.publish(topics::CHANNEL_LOGS_REALTIME, body.to_string());
                n += 1;
            }
            () = cancel.cancelled() => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let metrics_handle = pulse_server::metrics::install_recorder();

    let mut validator = StaticTokenValidator::new();
    if args.tokens.is_empty() {
        tracing::warn!("no --token given, accepting dev-token:local only");
        validator = validator.with_token("dev-token", "local");
    } else {
        for (token, user_id) in &args.tokens {
            validator = validator.with_token(token, user_id);
        }
    }

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_connections: args.max_connections,
        ..ServerConfig::default()
    };

    let registry = Arc::new(TopicRegistry::new());
    let stats = Arc::new(LiveStats::new());
    let broker = Arc::new(ChannelBroker::default());
    let publisher = broker.publisher();

    let server = PulseServer::new(config.clone(), registry.clone(), Arc::new(validator))
        .with_metrics(metrics_handle);
    let shutdown = server.shutdown().clone();

    let bridge = BrokerBridge::new(
        broker,
        registry.clone(),
        stats.clone(),
        config.broker_routes.clone(),
        config.bridge_base_delay_ms,
        config.bridge_max_delay_ms,
    );
    let bridge_handle = tokio::spawn(bridge.run(shutdown.token()));

    let metrics_handle_task = tokio::spawn(run_metrics_loop(
        stats,
        registry,
        Duration::from_secs(config.metrics_interval_secs),
        shutdown.token(),
    ));

    let mut task_handles = vec![bridge_handle, metrics_handle_task];
    if args.demo {
        tracing::info!("demo publisher enabled");
        task_handles.push(tokio::spawn(run_demo_publisher(
            publisher,
            shutdown.token(),
        )));
    }

    let (addr, serve_handle) = server.listen().await.context("failed to bind server")?;
    task_handles.push(serve_handle);
    tracing::info!("pulse listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    shutdown.graceful_shutdown(task_handles, None).await;
    tracing::info!("shutdown complete");
    Ok(())
}
