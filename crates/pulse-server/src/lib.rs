//! # pulse-server
//!
//! Axum HTTP + `WebSocket` server for live event distribution.
//!
//! - `WebSocket` gateway: token auth at upgrade, per-connection session task,
//!   heartbeat, control-frame dispatch
//! - Topic registry: join/leave/publish with non-blocking per-subscriber
//!   fan-out (serialize once, share as `Arc<str>`)
//! - Broker bridge: consumes an external pub/sub source with reconnect
//!   backoff and normalizes raw log payloads into typed events
//! - Live stats: sliding-window throughput counters published as periodic
//!   metric ticks
//! - HTTP endpoints: `/health`, Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod bridge;
pub mod broker;
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod topics;
pub mod websocket;
