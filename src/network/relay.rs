//! Reference relay
//!
//! An in-memory hub speaking the same JSON frames as [`TransportClient`].
//! Clients name their room in the `roomId` query parameter and authenticate
//! with a bearer token, which the relay uses as their user id.
//!
//! Rooms exist only while somebody is connected to them. A connection is a
//! room *member* from the handshake on, and a *participant* once it has
//! called `JoinRoom`. Room broadcasts go to participants only.
//!
//! [`TransportClient`]: super::TransportClient

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::connection::DEFAULT_HUB_PATH;
use super::e2ee::{E2EEInboundMessage, E2EEOperationResult, E2EEOutboundMessage};
use super::media::MediaType;
use super::signaling::{
    AnswerEvent, CallEndedEvent, HeartbeatAck, IceCandidateEvent, MediaStateEvent,
    MediaToggleEvent, OfferEvent, RoomParticipant, UserEvent,
};
use crate::protocol::{HubEvent, HubFrame, HubMethod};

/// E2EE result code when the addressed peer is not in the room
pub const E2EE_USER_NOT_FOUND: &str = "USER_NOT_FOUND";

/// Time given to a closing connection to flush its outbound queue
const FLUSH_GRACE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("WebSocket accept failed: {0}")]
    Handshake(String),
}

/// Identity established during the WebSocket handshake
#[derive(Debug, Clone)]
struct Session {
    room_id: String,
    user_id: String,
    connection_id: String,
}

struct Member {
    user_id: String,
    connection_id: String,
    /// Join order and time, set by `JoinRoom`
    joined: Option<(u64, DateTime<Utc>)>,
    camera_enabled: bool,
    microphone_enabled: bool,
    screen_share_enabled: bool,
    outbound: mpsc::UnboundedSender<Message>,
    kill: CancellationToken,
}

impl Member {
    fn is_participant(&self) -> bool {
        self.joined.is_some()
    }

    fn send_frame(&self, frame: &HubFrame) {
        match frame.to_text() {
            Ok(text) => {
                let _ = self.outbound.send(Message::Text(text));
            }
            Err(e) => error!("Failed to encode frame for {}: {}", self.user_id, e),
        }
    }

    fn send_event(&self, event: HubEvent, arguments: Vec<Value>) {
        self.send_frame(&HubFrame::event(event.as_str(), arguments));
    }

    fn participant(&self, is_initiator: bool) -> Option<RoomParticipant> {
        let (_, joined_at) = self.joined?;
        Some(RoomParticipant {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id.clone(),
            joined_at,
            camera_enabled: self.camera_enabled,
            microphone_enabled: self.microphone_enabled,
            screen_share_enabled: self.screen_share_enabled,
            is_initiator,
        })
    }
}

/// Members of one room, keyed by connection id
type Room = HashMap<String, Member>;

fn participants_of(room: &Room) -> Vec<RoomParticipant> {
    let mut joined: Vec<&Member> = room.values().filter(|m| m.is_participant()).collect();
    joined.sort_by_key(|m| m.joined.map(|(seq, _)| seq));
    joined
        .into_iter()
        .enumerate()
        .filter_map(|(i, m)| m.participant(i == 0))
        .collect()
}

/// Send an event to every participant except the originating connection
fn broadcast_others(room: &Room, from: &Session, event: HubEvent, arguments: Vec<Value>) {
    for member in room
        .values()
        .filter(|m| m.is_participant() && m.connection_id != from.connection_id)
    {
        member.send_event(event, arguments.clone());
    }
}

fn arg<T: DeserializeOwned>(arguments: &[Value], index: usize) -> Result<T, String> {
    let value = arguments
        .get(index)
        .cloned()
        .ok_or_else(|| format!("Missing argument {}", index))?;
    serde_json::from_value(value).map_err(|e| format!("Argument {}: {}", index, e))
}

fn payload<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn reject(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}

struct RelayState {
    hub_path: String,
    rooms: RwLock<HashMap<String, Room>>,
    join_seq: AtomicU64,
    shutdown: CancellationToken,
}

/// WebSocket relay for call signaling
#[derive(Clone)]
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayServer {
    pub fn new() -> Self {
        Self::with_hub_path(DEFAULT_HUB_PATH)
    }

    pub fn with_hub_path(hub_path: &str) -> Self {
        Self {
            state: Arc::new(RelayState {
                hub_path: hub_path.to_string(),
                rooms: RwLock::new(HashMap::new()),
                join_seq: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Bind to `addr` and serve until [`shutdown`](Self::shutdown)
    pub async fn run(&self, addr: &str) -> Result<(), RelayError> {
        let listener = TcpListener::bind(addr).await.map_err(RelayError::Bind)?;
        info!("Relay listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        loop {
            let accepted = tokio::select! {
                _ = self.state.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("New connection from {}", peer_addr);
                    let relay = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay.handle_connection(stream, peer_addr).await {
                            warn!("Connection error for {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }

        info!("Relay stopped");
        Ok(())
    }

    /// Stop accepting and drop every connection
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }

    /// Participants of a room in join order
    pub async fn participants(&self, room_id: &str) -> Vec<RoomParticipant> {
        self.state
            .rooms
            .read()
            .await
            .get(room_id)
            .map(participants_of)
            .unwrap_or_default()
    }

    /// Open connections across all rooms
    pub async fn connection_count(&self) -> usize {
        self.state.rooms.read().await.values().map(Room::len).sum()
    }

    /// Tell every participant of a room that the call is over. Returns the
    /// number of participants notified.
    pub async fn end_call(&self, room_id: &str, ended_by: &str, reason: Option<&str>) -> usize {
        let event = CallEndedEvent {
            room_id: room_id.to_string(),
            ended_by: ended_by.to_string(),
            reason: reason.map(str::to_string),
        };
        let Ok(value) = payload(&event) else {
            return 0;
        };

        let rooms = self.state.rooms.read().await;
        let Some(room) = rooms.get(room_id) else {
            return 0;
        };

        let mut notified = 0;
        for member in room.values().filter(|m| m.is_participant()) {
            member.send_event(HubEvent::CallEnded, vec![value.clone()]);
            notified += 1;
        }
        info!("Call in room {} ended by {}", room_id, ended_by);
        notified
    }

    /// Close every connection in a room with a hub close frame. Returns the
    /// number of connections closed.
    pub async fn disconnect_room(
        &self,
        room_id: &str,
        reason: Option<&str>,
        allow_reconnect: bool,
    ) -> usize {
        let frame = HubFrame::Close {
            error: reason.map(str::to_string),
            allow_reconnect,
        };

        let rooms = self.state.rooms.read().await;
        let Some(room) = rooms.get(room_id) else {
            return 0;
        };

        for member in room.values() {
            member.send_frame(&frame);
            let _ = member.outbound.send(Message::Close(None));
            member.kill.cancel();
        }
        info!(
            "Closed {} connections in room {} (reconnect allowed: {})",
            room.len(),
            room_id,
            allow_reconnect
        );
        room.len()
    }

    /// Validate the upgrade request: hub path, `roomId` and bearer token
    fn admit(&self, request: &Request) -> Result<(String, String), (StatusCode, &'static str)> {
        if request.uri().path() != self.state.hub_path {
            return Err((StatusCode::NOT_FOUND, "Unknown hub"));
        }

        let room_id = request
            .uri()
            .query()
            .and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == "roomId")
                    .map(|(_, value)| value.into_owned())
            })
            .filter(|room| !room.is_empty())
            .ok_or((StatusCode::BAD_REQUEST, "Missing roomId"))?;

        let user_id = request
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token"))?
            .to_string();

        Ok((room_id, user_id))
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), RelayError> {
        let mut admitted = None;
        let callback = |request: &Request, response: Response| match self.admit(request) {
            Ok(identity) => {
                admitted = Some(identity);
                Ok(response)
            }
            Err((status, message)) => {
                warn!("Rejected upgrade from {}: {}", peer_addr, message);
                Err(reject(status, message))
            }
        };
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .map_err(|e| RelayError::Handshake(e.to_string()))?;
        let Some((room_id, user_id)) = admitted else {
            return Err(RelayError::Handshake("Request was not admitted".to_string()));
        };

        let session = Session {
            room_id,
            user_id,
            connection_id: Uuid::new_v4().to_string(),
        };
        info!(
            "{} connected to room {} from {}",
            session.user_id, session.room_id, peer_addr
        );

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let kill = self.state.shutdown.child_token();

        self.state
            .rooms
            .write()
            .await
            .entry(session.room_id.clone())
            .or_default()
            .insert(
                session.connection_id.clone(),
                Member {
                    user_id: session.user_id.clone(),
                    connection_id: session.connection_id.clone(),
                    joined: None,
                    camera_enabled: false,
                    microphone_enabled: false,
                    screen_share_enabled: false,
                    outbound: outbound.clone(),
                    kill: kill.clone(),
                },
            );

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if write.send(msg).await.is_err() {
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        loop {
            let msg = tokio::select! {
                _ = kill.cancelled() => break,
                msg = read.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => match HubFrame::from_text(&text) {
                    Ok(HubFrame::Invocation {
                        invocation_id,
                        target,
                        arguments,
                    }) => {
                        let outcome = match HubMethod::parse(&target) {
                            Some(method) => self.handle_call(&session, method, arguments).await,
                            None => Err(format!("Unknown method {}", target)),
                        };
                        match (invocation_id, outcome) {
                            (Some(id), Ok(result)) => send(&outbound, &HubFrame::ok(id, result)),
                            (Some(id), Err(message)) => {
                                debug!("{} from {} failed: {}", target, session.user_id, message);
                                send(&outbound, &HubFrame::err(id, message));
                            }
                            (None, Err(message)) => {
                                debug!("{} from {} failed: {}", target, session.user_id, message)
                            }
                            (None, Ok(_)) => {}
                        }
                    }
                    Ok(HubFrame::Close { .. }) => break,
                    Ok(_) => {}
                    Err(e) => warn!("Invalid frame from {}: {}", session.user_id, e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket error from {}: {}", session.user_id, e);
                    break;
                }
            }
        }

        self.unregister(&session).await;
        drop(outbound);

        let abort = writer.abort_handle();
        if tokio::time::timeout(FLUSH_GRACE, writer).await.is_err() {
            abort.abort();
        }

        info!("{} disconnected from room {}", session.user_id, session.room_id);
        Ok(())
    }

    async fn unregister(&self, session: &Session) {
        let mut rooms = self.state.rooms.write().await;
        let Some(room) = rooms.get_mut(&session.room_id) else {
            return;
        };

        if let Some(member) = room.remove(&session.connection_id) {
            if member.is_participant() {
                if let Ok(value) = payload(&UserEvent {
                    user_id: member.user_id,
                }) {
                    broadcast_others(room, session, HubEvent::UserLeft, vec![value]);
                }
            }
        }

        if room.is_empty() {
            rooms.remove(&session.room_id);
            debug!("Room {} removed (empty)", session.room_id);
        }
    }

    async fn handle_call(
        &self,
        session: &Session,
        method: HubMethod,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let room_id: String = arg(&arguments, 0)?;
        if room_id != session.room_id {
            return Err(format!("Not connected to room {}", room_id));
        }

        let mut rooms = self.state.rooms.write().await;
        let room = rooms
            .get_mut(&session.room_id)
            .ok_or_else(|| format!("Room {} is closed", session.room_id))?;

        if method != HubMethod::JoinRoom
            && !room
                .get(&session.connection_id)
                .is_some_and(Member::is_participant)
        {
            return Err(format!("Join room {} first", session.room_id));
        }

        match method {
            HubMethod::JoinRoom => {
                let seq = self.state.join_seq.fetch_add(1, Ordering::SeqCst);
                let newly_joined = match room.get_mut(&session.connection_id) {
                    Some(member) if member.joined.is_none() => {
                        member.joined = Some((seq, Utc::now()));
                        true
                    }
                    Some(_) => false,
                    None => return Err("Connection is not registered".to_string()),
                };

                let participants = payload(&participants_of(room))?;
                if let Some(member) = room.get(&session.connection_id) {
                    member.send_event(
                        HubEvent::RoomJoined,
                        vec![Value::from(session.room_id.clone()), participants],
                    );
                }
                if newly_joined {
                    info!("{} joined room {}", session.user_id, session.room_id);
                    let joined = payload(&UserEvent {
                        user_id: session.user_id.clone(),
                    })?;
                    broadcast_others(room, session, HubEvent::UserJoined, vec![joined]);
                }
                Ok(None)
            }

            HubMethod::LeaveRoom => {
                if let Some(member) = room.get_mut(&session.connection_id) {
                    member.joined = None;
                }
                info!("{} left room {}", session.user_id, session.room_id);
                let left = payload(&UserEvent {
                    user_id: session.user_id.clone(),
                })?;
                broadcast_others(room, session, HubEvent::UserLeft, vec![left]);
                Ok(None)
            }

            HubMethod::SendOffer => {
                let target: String = arg(&arguments, 1)?;
                let event = payload(&OfferEvent {
                    from_user_id: session.user_id.clone(),
                    offer: arg(&arguments, 2)?,
                })?;
                route(room, session, &target, HubEvent::ReceiveOffer, event)?;
                Ok(None)
            }

            HubMethod::SendAnswer => {
                let target: String = arg(&arguments, 1)?;
                let event = payload(&AnswerEvent {
                    from_user_id: session.user_id.clone(),
                    answer: arg(&arguments, 2)?,
                })?;
                route(room, session, &target, HubEvent::ReceiveAnswer, event)?;
                Ok(None)
            }

            HubMethod::SendIceCandidate => {
                let target: String = arg(&arguments, 1)?;
                let event = payload(&IceCandidateEvent {
                    from_user_id: session.user_id.clone(),
                    candidate: arg(&arguments, 2)?,
                })?;
                route(room, session, &target, HubEvent::ReceiveIceCandidate, event)?;
                Ok(None)
            }

            HubMethod::MediaStateChanged => {
                let media_type: MediaType = arg(&arguments, 1)?;
                let enabled: bool = arg(&arguments, 2)?;
                update_media(room, session, media_type, enabled);
                let event = payload(&MediaStateEvent {
                    user_id: session.user_id.clone(),
                    media_type,
                    enabled,
                })?;
                broadcast_others(room, session, HubEvent::MediaStateChanged, vec![event]);
                Ok(None)
            }

            HubMethod::ToggleCamera | HubMethod::ToggleMicrophone => {
                let enabled: bool = arg(&arguments, 1)?;
                let (media_type, event) = if method == HubMethod::ToggleCamera {
                    (MediaType::Camera, HubEvent::CameraToggled)
                } else {
                    (MediaType::Microphone, HubEvent::MicrophoneToggled)
                };
                update_media(room, session, media_type, enabled);
                let toggled = payload(&MediaToggleEvent {
                    user_id: session.user_id.clone(),
                    enabled,
                })?;
                broadcast_others(room, session, event, vec![toggled]);
                Ok(None)
            }

            HubMethod::StartScreenShare | HubMethod::StopScreenShare => {
                let started = method == HubMethod::StartScreenShare;
                update_media(room, session, MediaType::ScreenShare, started);
                let event = if started {
                    HubEvent::ScreenShareStarted
                } else {
                    HubEvent::ScreenShareStopped
                };
                let user = payload(&UserEvent {
                    user_id: session.user_id.clone(),
                })?;
                broadcast_others(room, session, event, vec![user]);
                Ok(None)
            }

            HubMethod::SendHeartbeat => {
                let ack = payload(&HeartbeatAck {
                    timestamp: Utc::now().timestamp_millis(),
                })?;
                if let Some(member) = room.get(&session.connection_id) {
                    member.send_event(HubEvent::HeartbeatAck, vec![ack]);
                }
                Ok(None)
            }

            HubMethod::SendE2EEMessage => {
                let message: E2EEOutboundMessage = arg(&arguments, 1)?;
                let inbound = payload(&E2EEInboundMessage {
                    from_user_id: session.user_id.clone(),
                    message_type: message.message_type,
                    payload: message.payload,
                    timestamp: message.timestamp,
                })?;
                let result = match route(
                    room,
                    session,
                    &message.to_user_id,
                    HubEvent::ReceiveE2EEMessage,
                    inbound,
                ) {
                    Ok(()) => E2EEOperationResult::ok(),
                    Err(reason) => E2EEOperationResult::failure(E2EE_USER_NOT_FOUND, reason),
                };
                payload(&result).map(Some)
            }
        }
    }
}

fn send(outbound: &mpsc::UnboundedSender<Message>, frame: &HubFrame) {
    match frame.to_text() {
        Ok(text) => {
            let _ = outbound.send(Message::Text(text));
        }
        Err(e) => error!("Failed to encode frame: {}", e),
    }
}

/// Deliver an event to every connection of `target` in the room
fn route(
    room: &Room,
    from: &Session,
    target: &str,
    event: HubEvent,
    value: Value,
) -> Result<(), String> {
    let mut delivered = false;
    for member in room
        .values()
        .filter(|m| m.is_participant() && m.user_id == target)
    {
        member.send_event(event, vec![value.clone()]);
        delivered = true;
    }

    if delivered {
        debug!("{} {} -> {}", event, from.user_id, target);
        Ok(())
    } else {
        Err(format!("User {} is not in room {}", target, from.room_id))
    }
}

fn update_media(room: &mut Room, session: &Session, media_type: MediaType, enabled: bool) {
    if let Some(member) = room.get_mut(&session.connection_id) {
        match media_type {
            MediaType::Camera => member.camera_enabled = enabled,
            MediaType::Microphone => member.microphone_enabled = enabled,
            MediaType::ScreenShare => member.screen_share_enabled = enabled,
        }
    }
}
