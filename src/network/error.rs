//! Signaling error types

use std::fmt;

use thiserror::Error;

/// Coarse error category surfaced to callers for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingErrorKind {
    /// Connect attempt rejected, remote call rejected, or a load-bearing
    /// call attempted while not connected
    SignalingFailed,
    /// Connection closed unexpectedly
    SignalingDisconnected,
}

impl SignalingErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignalingFailed => "SIGNALING_FAILED",
            Self::SignalingDisconnected => "SIGNALING_DISCONNECTED",
        }
    }
}

impl fmt::Display for SignalingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the signaling subsystem
///
/// Payloads are kept as strings so the error can be cloned into
/// `last_error` and handed to error handlers at the same time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Connection closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    Disconnected(Option<String>),

    #[error("{method} rejected by relay: {message}")]
    Remote { method: String, message: String },

    #[error("{0} timed out waiting for acknowledgment")]
    Timeout(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl SignalingError {
    pub fn kind(&self) -> SignalingErrorKind {
        match self {
            Self::Disconnected(_) => SignalingErrorKind::SignalingDisconnected,
            _ => SignalingErrorKind::SignalingFailed,
        }
    }

    /// Wire-style error code
    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }
}
