//! End-to-end encryption key-exchange routing
//!
//! Only message routing lives here; the cryptography belongs to the caller.
//! Three legacy point-to-point channels (`ReceiveKeyOffer`,
//! `ReceiveKeyAnswer`, `ReceiveKeyRotation`) and the unified
//! `ReceiveE2EEMessage` channel all surface as [`E2EEInboundMessage`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::connection::TransportClient;
use super::error::SignalingError;
use crate::protocol::{HubEvent, HubMethod};

/// Error code returned when sending while not connected
pub const E2EE_NOT_CONNECTED: &str = "NOT_CONNECTED";

/// Error code returned when the relay could not take the message
pub const E2EE_SEND_FAILED: &str = "SEND_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum E2EEMessageType {
    KeyOffer,
    KeyAnswer,
    KeyRotation,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct E2EEInboundMessage {
    pub from_user_id: String,
    #[serde(rename = "type")]
    pub message_type: E2EEMessageType,
    /// Opaque encrypted payload
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct E2EEOutboundMessage {
    pub to_user_id: String,
    #[serde(rename = "type")]
    pub message_type: E2EEMessageType,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl E2EEOutboundMessage {
    /// New message stamped with the current time
    pub fn new(
        to_user_id: &str,
        message_type: E2EEMessageType,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            to_user_id: to_user_id.to_string(),
            message_type,
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of an outbound E2EE send. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct E2EEOperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl E2EEOperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
        }
    }

    pub fn not_connected() -> Self {
        Self::failure(E2EE_NOT_CONNECTED, "Signaling connection is not established")
    }
}

/// Message type carried by a legacy key-exchange event
pub fn legacy_message_type(event: HubEvent) -> Option<E2EEMessageType> {
    match event {
        HubEvent::ReceiveKeyOffer => Some(E2EEMessageType::KeyOffer),
        HubEvent::ReceiveKeyAnswer => Some(E2EEMessageType::KeyAnswer),
        HubEvent::ReceiveKeyRotation => Some(E2EEMessageType::KeyRotation),
        _ => None,
    }
}

/// Lift a legacy `(fromUserId, payload)` event into the unified shape,
/// stamped with the receive time
pub fn normalize_legacy(
    message_type: E2EEMessageType,
    from_user_id: String,
    payload: String,
) -> E2EEInboundMessage {
    E2EEInboundMessage {
        from_user_id,
        message_type,
        payload,
        timestamp: Utc::now(),
    }
}

/// Single outbound entry point for encrypted key exchange
#[derive(Clone)]
pub struct E2EEMessageBridge {
    transport: Arc<TransportClient>,
}

impl E2EEMessageBridge {
    pub fn new(transport: Arc<TransportClient>) -> Self {
        Self { transport }
    }

    pub fn is_available(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send a message to one peer. Never fails: problems are reported in
    /// the returned [`E2EEOperationResult`].
    pub async fn send(&self, message: &E2EEOutboundMessage) -> E2EEOperationResult {
        if !self.transport.is_connected() {
            return E2EEOperationResult::not_connected();
        }

        let payload = match serde_json::to_value(message) {
            Ok(payload) => payload,
            Err(e) => return E2EEOperationResult::failure(E2EE_SEND_FAILED, e.to_string()),
        };

        match self
            .transport
            .invoke_in_room(HubMethod::SendE2EEMessage, vec![payload])
            .await
        {
            Ok(Value::Null) => E2EEOperationResult::ok(),
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                debug!("Unrecognized E2EE send result, assuming success: {}", e);
                E2EEOperationResult::ok()
            }),
            Err(SignalingError::NotConnected) => E2EEOperationResult::not_connected(),
            Err(e) => {
                warn!("E2EE send to {} failed: {}", message.to_user_id, e);
                E2EEOperationResult::failure(E2EE_SEND_FAILED, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connection::{TransportConfig, TransportListener};

    struct Silent;

    impl TransportListener for Silent {
        fn on_invocation(&self, _target: &str, _arguments: Vec<Value>) {}
    }

    #[tokio::test]
    async fn test_send_when_disconnected() {
        let transport = Arc::new(TransportClient::new(
            TransportConfig::new("ws://127.0.0.1:1"),
            Arc::new(Silent),
        ));
        let bridge = E2EEMessageBridge::new(transport);

        let result = bridge
            .send(&E2EEOutboundMessage::new(
                "bob",
                E2EEMessageType::KeyOffer,
                "pubkey",
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("NOT_CONNECTED"));
        assert!(!bridge.is_available());
    }

    #[test]
    fn test_legacy_type_mapping() {
        assert_eq!(
            legacy_message_type(HubEvent::ReceiveKeyOffer),
            Some(E2EEMessageType::KeyOffer)
        );
        assert_eq!(
            legacy_message_type(HubEvent::ReceiveKeyAnswer),
            Some(E2EEMessageType::KeyAnswer)
        );
        assert_eq!(
            legacy_message_type(HubEvent::ReceiveKeyRotation),
            Some(E2EEMessageType::KeyRotation)
        );
        assert_eq!(legacy_message_type(HubEvent::UserJoined), None);
    }

    #[test]
    fn test_normalize_legacy_stamps_time() {
        let before = Utc::now();
        let message = normalize_legacy(
            E2EEMessageType::KeyAnswer,
            "alice".to_string(),
            "blob".to_string(),
        );
        assert!(message.timestamp >= before);
        assert_eq!(message.message_type, E2EEMessageType::KeyAnswer);
    }

    #[test]
    fn test_result_wire_shape() {
        let json = serde_json::to_value(E2EEOperationResult::not_connected()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorCode"], "NOT_CONNECTED");

        let ok = serde_json::to_string(&E2EEOperationResult::ok()).unwrap();
        assert_eq!(ok, r#"{"success":true}"#);
    }
}
