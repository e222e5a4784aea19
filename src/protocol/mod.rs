//! Relay protocol definitions
//!
//! Defines the JSON frame format and the remote method/event names spoken
//! between clients and the signaling relay.

mod frame;
mod methods;

pub use frame::HubFrame;
pub use methods::{HubEvent, HubMethod};
