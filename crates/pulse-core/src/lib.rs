//! # pulse-core
//!
//! Foundation types for the Pulse event distribution system.
//!
//! This crate provides the shared vocabulary that the server, client, and
//! daemon crates depend on:
//!
//! - **Branded IDs**: `EventId`, `ConnectionId` as newtypes for type safety
//! - **Events**: `Event` with the `EventKind` tagged union (logs, metrics,
//!   alerts, notifications, upload status)
//! - **Filters**: `EventFilter` conjunction matching for log events
//! - **Wire protocol**: `ClientFrame` / `ServerFrame` / `EventEnvelope` JSON frames
//! - **Backoff**: `ReconnectPolicy` exponential delay math with jitter
//! - **Errors**: `ProtocolError` via `thiserror`

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod event;
pub mod filter;
pub mod ids;
pub mod protocol;

pub use backoff::ReconnectPolicy;
pub use errors::ProtocolError;
pub use event::{Event, EventKind, LogLevel, LogRecord, MetricSnapshot};
pub use filter::EventFilter;
pub use ids::{ConnectionId, EventId};
pub use protocol::{ClientFrame, EventEnvelope, ServerFrame, CLOSE_UNAUTHORIZED};
