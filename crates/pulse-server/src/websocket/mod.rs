//! WebSocket gateway: connection handles, topic registry, session loop.

pub mod connection;
pub mod registry;
pub mod session;
