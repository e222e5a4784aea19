//! Local media state notifications
//!
//! Thin wrappers that tell the relay about camera, microphone and screen
//! share changes. Unlike heartbeats these are load-bearing: every failure,
//! including "not connected", is returned to the caller.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::connection::TransportClient;
use super::error::SignalingError;
use crate::protocol::HubMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaType {
    Camera,
    Microphone,
    ScreenShare,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::ScreenShare => "screenShare",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct MediaStateCoordinator {
    transport: Arc<TransportClient>,
}

impl MediaStateCoordinator {
    pub fn new(transport: Arc<TransportClient>) -> Self {
        Self { transport }
    }

    pub async fn toggle_camera(&self, enabled: bool) -> Result<(), SignalingError> {
        self.send(HubMethod::ToggleCamera, vec![Value::from(enabled)])
            .await
    }

    pub async fn toggle_microphone(&self, enabled: bool) -> Result<(), SignalingError> {
        self.send(HubMethod::ToggleMicrophone, vec![Value::from(enabled)])
            .await
    }

    pub async fn start_screen_share(&self) -> Result<(), SignalingError> {
        self.send(HubMethod::StartScreenShare, vec![]).await
    }

    pub async fn stop_screen_share(&self) -> Result<(), SignalingError> {
        self.send(HubMethod::StopScreenShare, vec![]).await
    }

    /// Generic media-state notification
    pub async fn notify_media_state_changed(
        &self,
        media_type: MediaType,
        enabled: bool,
    ) -> Result<(), SignalingError> {
        let media_type = serde_json::to_value(media_type)
            .map_err(|e| SignalingError::Protocol(e.to_string()))?;
        self.send(
            HubMethod::MediaStateChanged,
            vec![media_type, Value::from(enabled)],
        )
        .await
    }

    async fn send(&self, method: HubMethod, arguments: Vec<Value>) -> Result<(), SignalingError> {
        self.transport.invoke_in_room(method, arguments).await?;
        debug!("{} acknowledged", method);
        Ok(())
    }
}
