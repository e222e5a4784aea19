//! Signaling router
//!
//! Decodes relay events into typed [`SignalingEvent`]s and hands each one to
//! the matching slot of a [`SignalingHandlers`] table. Every slot holds zero
//! or one handler; events without a handler are dropped silently.
//!
//! Outbound negotiation calls (join/leave, offer/answer/ICE, heartbeat) are
//! encoded as hub invocations on the underlying [`TransportClient`]. Media
//! toggles go through [`MediaStateCoordinator`] and encrypted key exchange
//! through [`E2EEMessageBridge`], both handed out by the router.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::{
    ConnectionState, TokenProvider, TransportClient, TransportConfig, TransportListener,
};
use super::e2ee::{self, E2EEInboundMessage, E2EEMessageBridge};
use super::error::SignalingError;
use super::heartbeat;
use super::media::{MediaStateCoordinator, MediaType};
use crate::protocol::{HubEvent, HubMethod};

/// A participant as reported by the relay when joining a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    pub user_id: String,
    pub connection_id: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub camera_enabled: bool,
    #[serde(default)]
    pub microphone_enabled: bool,
    #[serde(default)]
    pub screen_share_enabled: bool,
    #[serde(default)]
    pub is_initiator: bool,
}

/// `RoomJoined(roomId, participants[])`
#[derive(Debug, Clone, PartialEq)]
pub struct RoomJoined {
    pub room_id: String,
    pub participants: Vec<RoomParticipant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferEvent {
    pub from_user_id: String,
    pub offer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub from_user_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateEvent {
    pub from_user_id: String,
    pub candidate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEndedEvent {
    pub room_id: String,
    pub ended_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStateEvent {
    pub user_id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub enabled: bool,
}

/// Payload of `CameraToggled` and `MicrophoneToggled`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaToggleEvent {
    pub user_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    /// Relay time, unix milliseconds
    pub timestamp: i64,
}

/// Every inbound event the router understands
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    RoomJoined(RoomJoined),
    UserJoined(UserEvent),
    UserLeft(UserEvent),
    Offer(OfferEvent),
    Answer(AnswerEvent),
    IceCandidate(IceCandidateEvent),
    CallEnded(CallEndedEvent),
    MediaStateChanged(MediaStateEvent),
    CameraToggled(MediaToggleEvent),
    MicrophoneToggled(MediaToggleEvent),
    ScreenShareStarted(UserEvent),
    ScreenShareStopped(UserEvent),
    HeartbeatAck(HeartbeatAck),
    /// Unified and legacy key-exchange channels, normalized
    E2EEMessage(E2EEInboundMessage),
}

fn arg<T: DeserializeOwned>(
    event: HubEvent,
    arguments: &[Value],
    index: usize,
) -> Result<T, SignalingError> {
    let value = arguments.get(index).cloned().ok_or_else(|| {
        SignalingError::Protocol(format!("{} missing argument {}", event, index))
    })?;
    serde_json::from_value(value)
        .map_err(|e| SignalingError::Protocol(format!("{} argument {}: {}", event, index, e)))
}

impl SignalingEvent {
    /// Decode a relay invocation. Returns `Ok(None)` for events this client
    /// does not know about.
    pub fn decode(target: &str, arguments: &[Value]) -> Result<Option<Self>, SignalingError> {
        let Some(event) = HubEvent::parse(target) else {
            return Ok(None);
        };

        let decoded = match event {
            HubEvent::RoomJoined => Self::RoomJoined(RoomJoined {
                room_id: arg(event, arguments, 0)?,
                participants: arg(event, arguments, 1)?,
            }),
            HubEvent::UserJoined => Self::UserJoined(arg(event, arguments, 0)?),
            HubEvent::UserLeft => Self::UserLeft(arg(event, arguments, 0)?),
            HubEvent::ReceiveOffer => Self::Offer(arg(event, arguments, 0)?),
            HubEvent::ReceiveAnswer => Self::Answer(arg(event, arguments, 0)?),
            HubEvent::ReceiveIceCandidate => Self::IceCandidate(arg(event, arguments, 0)?),
            HubEvent::CallEnded => Self::CallEnded(arg(event, arguments, 0)?),
            HubEvent::MediaStateChanged => Self::MediaStateChanged(arg(event, arguments, 0)?),
            HubEvent::CameraToggled => Self::CameraToggled(arg(event, arguments, 0)?),
            HubEvent::MicrophoneToggled => Self::MicrophoneToggled(arg(event, arguments, 0)?),
            HubEvent::ScreenShareStarted => Self::ScreenShareStarted(arg(event, arguments, 0)?),
            HubEvent::ScreenShareStopped => Self::ScreenShareStopped(arg(event, arguments, 0)?),
            HubEvent::HeartbeatAck => Self::HeartbeatAck(arg(event, arguments, 0)?),
            HubEvent::ReceiveE2EEMessage => Self::E2EEMessage(arg(event, arguments, 0)?),
            HubEvent::ReceiveKeyOffer
            | HubEvent::ReceiveKeyAnswer
            | HubEvent::ReceiveKeyRotation => {
                let from_user_id: String = arg(event, arguments, 0)?;
                let payload: String = arg(event, arguments, 1)?;
                match e2ee::legacy_message_type(event) {
                    Some(kind) => Self::E2EEMessage(e2ee::normalize_legacy(
                        kind,
                        from_user_id,
                        payload,
                    )),
                    None => return Ok(None),
                }
            }
        };

        Ok(Some(decoded))
    }
}

type Handler<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

/// Optional-subscriber dispatch table, one slot per event
#[derive(Default)]
pub struct SignalingHandlers {
    room_joined: Option<Handler<RoomJoined>>,
    user_joined: Option<Handler<UserEvent>>,
    user_left: Option<Handler<UserEvent>>,
    offer: Option<Handler<OfferEvent>>,
    answer: Option<Handler<AnswerEvent>>,
    ice_candidate: Option<Handler<IceCandidateEvent>>,
    call_ended: Option<Handler<CallEndedEvent>>,
    media_state_changed: Option<Handler<MediaStateEvent>>,
    camera_toggled: Option<Handler<MediaToggleEvent>>,
    microphone_toggled: Option<Handler<MediaToggleEvent>>,
    screen_share_started: Option<Handler<UserEvent>>,
    screen_share_stopped: Option<Handler<UserEvent>>,
    heartbeat_ack: Option<Handler<HeartbeatAck>>,
    e2ee_message: Option<Handler<E2EEInboundMessage>>,
    state_changed: Option<Handler<ConnectionState>>,
    error: Option<Handler<SignalingError>>,
}

impl SignalingHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_room_joined<F>(mut self, f: F) -> Self
    where
        F: Fn(RoomJoined) + Send + Sync + 'static,
    {
        self.room_joined = Some(Box::new(f));
        self
    }

    pub fn on_user_joined<F>(mut self, f: F) -> Self
    where
        F: Fn(UserEvent) + Send + Sync + 'static,
    {
        self.user_joined = Some(Box::new(f));
        self
    }

    pub fn on_user_left<F>(mut self, f: F) -> Self
    where
        F: Fn(UserEvent) + Send + Sync + 'static,
    {
        self.user_left = Some(Box::new(f));
        self
    }

    pub fn on_offer<F>(mut self, f: F) -> Self
    where
        F: Fn(OfferEvent) + Send + Sync + 'static,
    {
        self.offer = Some(Box::new(f));
        self
    }

    pub fn on_answer<F>(mut self, f: F) -> Self
    where
        F: Fn(AnswerEvent) + Send + Sync + 'static,
    {
        self.answer = Some(Box::new(f));
        self
    }

    pub fn on_ice_candidate<F>(mut self, f: F) -> Self
    where
        F: Fn(IceCandidateEvent) + Send + Sync + 'static,
    {
        self.ice_candidate = Some(Box::new(f));
        self
    }

    pub fn on_call_ended<F>(mut self, f: F) -> Self
    where
        F: Fn(CallEndedEvent) + Send + Sync + 'static,
    {
        self.call_ended = Some(Box::new(f));
        self
    }

    pub fn on_media_state_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(MediaStateEvent) + Send + Sync + 'static,
    {
        self.media_state_changed = Some(Box::new(f));
        self
    }

    pub fn on_camera_toggled<F>(mut self, f: F) -> Self
    where
        F: Fn(MediaToggleEvent) + Send + Sync + 'static,
    {
        self.camera_toggled = Some(Box::new(f));
        self
    }

    pub fn on_microphone_toggled<F>(mut self, f: F) -> Self
    where
        F: Fn(MediaToggleEvent) + Send + Sync + 'static,
    {
        self.microphone_toggled = Some(Box::new(f));
        self
    }

    pub fn on_screen_share_started<F>(mut self, f: F) -> Self
    where
        F: Fn(UserEvent) + Send + Sync + 'static,
    {
        self.screen_share_started = Some(Box::new(f));
        self
    }

    pub fn on_screen_share_stopped<F>(mut self, f: F) -> Self
    where
        F: Fn(UserEvent) + Send + Sync + 'static,
    {
        self.screen_share_stopped = Some(Box::new(f));
        self
    }

    pub fn on_heartbeat_ack<F>(mut self, f: F) -> Self
    where
        F: Fn(HeartbeatAck) + Send + Sync + 'static,
    {
        self.heartbeat_ack = Some(Box::new(f));
        self
    }

    /// Receives unified E2EE messages and normalized legacy key exchanges
    pub fn on_e2ee_message<F>(mut self, f: F) -> Self
    where
        F: Fn(E2EEInboundMessage) + Send + Sync + 'static,
    {
        self.e2ee_message = Some(Box::new(f));
        self
    }

    pub fn on_state_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.state_changed = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(SignalingError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    /// Hand `event` to its slot. Returns false when no handler is registered.
    pub fn dispatch(&self, event: SignalingEvent) -> bool {
        fn call<T>(slot: &Option<Handler<T>>, value: T) -> bool {
            match slot {
                Some(handler) => {
                    handler(value);
                    true
                }
                None => false,
            }
        }

        match event {
            SignalingEvent::RoomJoined(e) => call(&self.room_joined, e),
            SignalingEvent::UserJoined(e) => call(&self.user_joined, e),
            SignalingEvent::UserLeft(e) => call(&self.user_left, e),
            SignalingEvent::Offer(e) => call(&self.offer, e),
            SignalingEvent::Answer(e) => call(&self.answer, e),
            SignalingEvent::IceCandidate(e) => call(&self.ice_candidate, e),
            SignalingEvent::CallEnded(e) => call(&self.call_ended, e),
            SignalingEvent::MediaStateChanged(e) => call(&self.media_state_changed, e),
            SignalingEvent::CameraToggled(e) => call(&self.camera_toggled, e),
            SignalingEvent::MicrophoneToggled(e) => call(&self.microphone_toggled, e),
            SignalingEvent::ScreenShareStarted(e) => call(&self.screen_share_started, e),
            SignalingEvent::ScreenShareStopped(e) => call(&self.screen_share_stopped, e),
            SignalingEvent::HeartbeatAck(e) => call(&self.heartbeat_ack, e),
            SignalingEvent::E2EEMessage(e) => call(&self.e2ee_message, e),
        }
    }
}

/// Bridges transport callbacks into the handler table
struct Dispatcher {
    handlers: SignalingHandlers,
}

impl TransportListener for Dispatcher {
    fn on_invocation(&self, target: &str, arguments: Vec<Value>) {
        match SignalingEvent::decode(target, &arguments) {
            Ok(Some(event)) => {
                if !self.handlers.dispatch(event) {
                    debug!("No handler for {}", target);
                }
            }
            Ok(None) => debug!("Ignoring unknown relay event {}", target),
            Err(e) => warn!("Dropping malformed {} event: {}", target, e),
        }
    }

    fn on_state_changed(&self, state: ConnectionState) {
        if let Some(handler) = &self.handlers.state_changed {
            handler(state);
        }
    }

    fn on_error(&self, error: &SignalingError) {
        if let Some(handler) = &self.handlers.error {
            handler(error.clone());
        }
    }
}

/// Typed signaling surface over one relay connection
///
/// ```no_run
/// use std::sync::Arc;
/// use callsignal::network::{SignalingHandlers, SignalingRouter, TransportConfig};
///
/// # tokio_test::block_on(async {
/// let handlers = SignalingHandlers::new()
///     .on_user_joined(|user| println!("{} joined", user.user_id))
///     .on_offer(|offer| println!("offer from {}", offer.from_user_id));
///
/// let router = SignalingRouter::new(TransportConfig::new("ws://127.0.0.1:8080"), handlers);
/// router.connect("standup", Arc::new(|| Some("alice".to_string()))).await;
/// router.join_room().await?;
/// router.send_offer("bob", "v=0").await?;
/// # Ok::<(), callsignal::SignalingError>(())
/// # });
/// ```
pub struct SignalingRouter {
    transport: Arc<TransportClient>,
}

impl SignalingRouter {
    pub fn new(config: TransportConfig, handlers: SignalingHandlers) -> Self {
        Self::with_owner(config, handlers, CancellationToken::new())
    }

    /// Bind the router (and its transport) to an owner scope
    pub fn with_owner(
        config: TransportConfig,
        handlers: SignalingHandlers,
        owner: CancellationToken,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher { handlers });
        Self {
            transport: Arc::new(TransportClient::with_owner(config, dispatcher, owner)),
        }
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn room_id(&self) -> Option<String> {
        self.transport.room_id()
    }

    /// See [`TransportClient::connect`]
    pub async fn connect(&self, room_id: &str, token_provider: TokenProvider) {
        self.transport.connect(room_id, token_provider).await;
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    pub async fn join_room(&self) -> Result<(), SignalingError> {
        self.call(HubMethod::JoinRoom, vec![]).await
    }

    pub async fn leave_room(&self) -> Result<(), SignalingError> {
        self.call(HubMethod::LeaveRoom, vec![]).await
    }

    pub async fn send_offer(&self, target_user_id: &str, sdp: &str) -> Result<(), SignalingError> {
        self.call(
            HubMethod::SendOffer,
            vec![Value::from(target_user_id), Value::from(sdp)],
        )
        .await
    }

    pub async fn send_answer(&self, target_user_id: &str, sdp: &str) -> Result<(), SignalingError> {
        self.call(
            HubMethod::SendAnswer,
            vec![Value::from(target_user_id), Value::from(sdp)],
        )
        .await
    }

    pub async fn send_ice_candidate(
        &self,
        target_user_id: &str,
        candidate: &str,
    ) -> Result<(), SignalingError> {
        self.call(
            HubMethod::SendIceCandidate,
            vec![Value::from(target_user_id), Value::from(candidate)],
        )
        .await
    }

    /// Liveness ping. Succeeds without effect while not connected.
    pub async fn send_heartbeat(&self) -> Result<(), SignalingError> {
        heartbeat::send_heartbeat(&self.transport).await
    }

    pub fn media(&self) -> MediaStateCoordinator {
        MediaStateCoordinator::new(self.transport.clone())
    }

    pub fn e2ee(&self) -> E2EEMessageBridge {
        E2EEMessageBridge::new(self.transport.clone())
    }

    async fn call(&self, method: HubMethod, arguments: Vec<Value>) -> Result<(), SignalingError> {
        self.transport
            .invoke_in_room(method, arguments)
            .await
            .map(|_| ())
    }
}
