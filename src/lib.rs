//! callsignal - Real-time call signaling over a WebSocket relay
//!
//! This library provides the client side of call setup: a reconnecting relay
//! connection, typed routing of negotiation and media events, E2EE key
//! exchange messaging and network quality estimation. A small reference
//! relay is included for local use.

pub mod config;
pub mod network;
pub mod protocol;

pub use config::SignalingConfig;
pub use network::{ConnectionState, SignalingError, SignalingRouter, TransportClient};
pub use protocol::HubFrame;
