//! Hub frame definitions for the callsignal relay protocol
//!
//! Every WebSocket text frame carries exactly one JSON object tagged by `type`:
//! - `invocation`: a remote call. Client calls carry an `invocationId` and expect
//!   a `completion`; server events omit it.
//! - `completion`: acknowledgment of an invocation, with `result` or `error`.
//! - `ping`: keep-alive, carries nothing.
//! - `close`: server-initiated close, optionally forbidding reconnection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HubFrame {
    #[serde(rename_all = "camelCase")]
    Invocation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invocation_id: Option<String>,
        target: String,
        #[serde(default)]
        arguments: Vec<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Completion {
        invocation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Ping,
    #[serde(rename_all = "camelCase")]
    Close {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default = "default_allow_reconnect")]
        allow_reconnect: bool,
    },
}

fn default_allow_reconnect() -> bool {
    true
}

impl HubFrame {
    /// Client call that expects a completion
    pub fn call(invocation_id: impl Into<String>, target: &str, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.to_string(),
            arguments,
        }
    }

    /// Server-pushed event (no completion expected)
    pub fn event(target: &str, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        }
    }

    /// Successful completion
    pub fn ok(invocation_id: impl Into<String>, result: Option<Value>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result,
            error: None,
        }
    }

    /// Failed completion
    pub fn err(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Encode to the JSON text carried by one WebSocket frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode one WebSocket text frame
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_wire_shape() {
        let frame = HubFrame::call("7", "JoinRoom", vec![json!("room-1")]);
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "invocation",
                "invocationId": "7",
                "target": "JoinRoom",
                "arguments": ["room-1"]
            })
        );
    }

    #[test]
    fn test_event_omits_invocation_id() {
        let text = HubFrame::event("UserLeft", vec![json!({"userId": "bob"})])
            .to_text()
            .unwrap();
        assert!(!text.contains("invocationId"));
    }

    #[test]
    fn test_close_defaults_to_reconnect_allowed() {
        let frame = HubFrame::from_text(r#"{"type":"close","error":"server restart"}"#).unwrap();
        assert_eq!(
            frame,
            HubFrame::Close {
                error: Some("server restart".to_string()),
                allow_reconnect: true,
            }
        );
    }

    #[test]
    fn test_completion_error_parse() {
        let frame =
            HubFrame::from_text(r#"{"type":"completion","invocationId":"3","error":"denied"}"#)
                .unwrap();
        match frame {
            HubFrame::Completion {
                invocation_id,
                result,
                error,
            } => {
                assert_eq!(invocation_id, "3");
                assert!(result.is_none());
                assert_eq!(error.as_deref(), Some("denied"));
            }
            other => panic!("Wrong frame type: {:?}", other),
        }
    }
}
