//! # pulse-client
//!
//! Consumer side of the event stream: a bounded in-memory buffer of recent
//! events, a controller for pause/filter state, and a `WebSocket` client
//! that keeps the stream alive across disconnects with exponential
//! backoff.

#![deny(unsafe_code)]

pub mod client;
pub mod controller;
pub mod ring;

pub use client::{ClientConfig, ClientError, StreamClient};
pub use controller::{ConnectionStatus, StreamController};
pub use ring::EventRing;
