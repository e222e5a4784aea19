//! Persistent relay connection with automatic reconnection
//!
//! [`TransportClient`] owns one logical WebSocket connection to the relay.
//! It is responsible only for connect/disconnect, request/acknowledge calls,
//! handing inbound invocations to a [`TransportListener`], and raw
//! [`ConnectionState`] transitions.
//!
//! Every connect or disconnect opens a new *epoch*. The live link is moved
//! out of the shared slot before any suspension point, and any state write
//! that follows an await is only applied if its epoch is still current and
//! the owner scope has not been cancelled. A disconnect that starts while a
//! connect is still handshaking therefore invalidates that connect (and the
//! other way around) without either operation blocking on the other.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::error::SignalingError;
use super::reconnect::ReconnectPolicy;
use crate::protocol::{HubFrame, HubMethod};

/// Default hub path appended to the relay base URL
pub const DEFAULT_HUB_PATH: &str = "/hubs/videocall";

/// Default time to wait for a handshake or an invocation acknowledgment
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a graceful close may take before the link tasks are aborted
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Connection state
///
/// ```text
/// [*] --> Disconnected
/// Disconnected --> Connecting: connect()
/// Connecting --> Connected: handshake ok
/// Connecting --> Error: handshake failed
/// Connected --> Reconnecting: connection lost
/// Reconnecting --> Connected: reconnect success
/// Reconnecting --> Disconnected: policy gave up
/// * --> Disconnected: disconnect()
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Error = 4,
}

impl ConnectionState {
    /// Convert from u8 value
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Error,
            _ => Self::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Bearer token accessor, evaluated on every (re)connect
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync + 'static>;

/// Receives everything the transport surfaces to upper layers
pub trait TransportListener: Send + Sync + 'static {
    /// A server-pushed invocation (event) arrived
    fn on_invocation(&self, target: &str, arguments: Vec<Value>);

    /// The connection state changed
    fn on_state_changed(&self, _state: ConnectionState) {}

    /// A connect attempt failed or the connection was lost for good
    fn on_error(&self, _error: &SignalingError) {}
}

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Relay base URL (ws:// or wss://)
    pub server_url: String,
    /// Hub path appended to the base URL
    pub hub_path: String,
    pub reconnect: ReconnectPolicy,
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            reconnect: ReconnectPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Build the hub address for a room: `{server}{hub_path}?roomId=<encoded>`
pub fn hub_url(server_url: &str, hub_path: &str, room_id: &str) -> Result<Url, SignalingError> {
    let base = server_url.trim_end_matches('/');
    let path = if hub_path.starts_with('/') {
        hub_path.to_string()
    } else {
        format!("/{}", hub_path)
    };
    let mut url = Url::parse(&format!("{}{}", base, path))
        .map_err(|e| SignalingError::ConnectFailed(format!("Invalid relay URL: {}", e)))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(SignalingError::ConnectFailed(format!(
                "Unsupported relay scheme: {}",
                other
            )))
        }
    }

    url.query_pairs_mut().append_pair("roomId", room_id);
    Ok(url)
}

/// Why a link stopped
#[derive(Debug, Clone)]
struct LinkClosed {
    error: Option<String>,
    allow_reconnect: bool,
}

type PendingCalls = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, String>>>>>;

/// One live WebSocket connection: a writer task, a reader task and the
/// table of invocations awaiting completion.
struct HubLink {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingCalls,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl HubLink {
    async fn open(
        url: &Url,
        token: Option<String>,
        handshake_timeout: Duration,
        listener: Arc<dyn TransportListener>,
        scope: CancellationToken,
    ) -> Result<(Arc<Self>, oneshot::Receiver<LinkClosed>), SignalingError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SignalingError::ConnectFailed(format!("Bad request: {}", e)))?;

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SignalingError::ConnectFailed(format!("Bad token: {}", e)))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _) = tokio::time::timeout(
            handshake_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| SignalingError::ConnectFailed("Handshake timed out".to_string()))?
        .map_err(|e| SignalingError::ConnectFailed(e.to_string()))?;

        debug!("Connected to relay: {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (closed_tx, closed_rx) = oneshot::channel();
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    debug!("Relay write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            let closure = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match HubFrame::from_text(&text) {
                        Ok(HubFrame::Completion {
                            invocation_id,
                            result,
                            error,
                        }) => {
                            let waiter = reader_pending.lock().remove(&invocation_id);
                            match waiter {
                                Some(tx) => {
                                    let outcome = match error {
                                        Some(message) => Err(message),
                                        None => Ok(result.unwrap_or(Value::Null)),
                                    };
                                    let _ = tx.send(outcome);
                                }
                                None => debug!("Completion for unknown call {}", invocation_id),
                            }
                        }
                        Ok(HubFrame::Invocation {
                            target, arguments, ..
                        }) => {
                            if scope.is_cancelled() {
                                continue;
                            }
                            trace!("Relay event {}", target);
                            listener.on_invocation(&target, arguments);
                        }
                        Ok(HubFrame::Ping) => {}
                        Ok(HubFrame::Close {
                            error,
                            allow_reconnect,
                        }) => {
                            break LinkClosed {
                                error,
                                allow_reconnect,
                            };
                        }
                        Err(e) => warn!("Invalid relay frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        break LinkClosed {
                            error: reason,
                            allow_reconnect: true,
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break LinkClosed {
                            error: Some(e.to_string()),
                            allow_reconnect: true,
                        };
                    }
                    None => {
                        break LinkClosed {
                            error: None,
                            allow_reconnect: true,
                        };
                    }
                }
            };

            // Nobody will complete these any more
            reader_pending.lock().clear();
            let _ = closed_tx.send(closure);
        });

        let link = Arc::new(Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        });

        Ok((link, closed_rx))
    }

    /// Invoke a remote method and wait for its completion
    async fn invoke(
        &self,
        method: HubMethod,
        arguments: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, SignalingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let text = HubFrame::call(id.clone(), method.as_str(), arguments)
            .to_text()
            .map_err(|e| SignalingError::Protocol(format!("Serialize failed: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        if self.outbound.send(Message::Text(text)).is_err() {
            self.pending.lock().remove(&id);
            return Err(SignalingError::SendFailed("Connection closed".to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(SignalingError::Remote {
                method: method.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(SignalingError::SendFailed(format!(
                "Connection closed before {} was acknowledged",
                method
            ))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(SignalingError::Timeout(method.to_string()))
            }
        }
    }

    /// Close gracefully, aborting the link tasks if the peer does not
    /// finish the close handshake in time
    async fn close(&self) -> Result<(), SignalingError> {
        let sent = self.outbound.send(Message::Close(None));

        let reader = self.reader.lock().take();
        let finished = match reader {
            Some(handle) => {
                let abort = handle.abort_handle();
                match tokio::time::timeout(CLOSE_GRACE, handle).await {
                    Ok(_) => true,
                    Err(_) => {
                        abort.abort();
                        false
                    }
                }
            }
            None => true,
        };

        if let Some(handle) = self.writer.lock().take() {
            handle.abort();
        }

        match (sent, finished) {
            (Err(_), _) => Err(SignalingError::SendFailed(
                "Link already closed".to_string(),
            )),
            (_, false) => Err(SignalingError::Timeout("close".to_string())),
            _ => Ok(()),
        }
    }
}

impl Drop for HubLink {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.writer.lock().take() {
            handle.abort();
        }
    }
}

/// Shared slot holding the live link and the current epoch
struct LinkSlot {
    epoch: u64,
    link: Option<Arc<HubLink>>,
    /// Cancelled when the epoch ends; guards the reconnect timer
    scope: CancellationToken,
    room_id: Option<String>,
    token_provider: Option<TokenProvider>,
}

struct Inner {
    config: TransportConfig,
    listener: Arc<dyn TransportListener>,
    owner: CancellationToken,
    state: AtomicU8,
    attempts: AtomicU32,
    last_error: Mutex<Option<SignalingError>>,
    slot: Mutex<LinkSlot>,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Start a new epoch: cancel the previous one and move its link out
    fn begin_epoch(
        &self,
        target: Option<(String, TokenProvider)>,
    ) -> (u64, CancellationToken, Option<Arc<HubLink>>) {
        let mut slot = self.slot.lock();
        slot.epoch += 1;
        slot.scope.cancel();
        slot.scope = self.owner.child_token();
        match target {
            Some((room_id, provider)) => {
                slot.room_id = Some(room_id);
                slot.token_provider = Some(provider);
            }
            None => {
                slot.room_id = None;
                slot.token_provider = None;
            }
        }
        (slot.epoch, slot.scope.clone(), slot.link.take())
    }

    fn target(&self) -> Option<(String, TokenProvider)> {
        let slot = self.slot.lock();
        match (&slot.room_id, &slot.token_provider) {
            (Some(room), Some(provider)) => Some((room.clone(), provider.clone())),
            _ => None,
        }
    }

    /// Apply a state transition if `epoch` is still current and the owner
    /// is alive. Optionally installs a new link in the same critical section.
    fn transition(
        &self,
        epoch: u64,
        next: ConnectionState,
        link: Option<Arc<HubLink>>,
    ) -> bool {
        self.apply(epoch, next, link, None)
    }

    /// [`transition`](Self::transition) that also records `error`, visible
    /// to state handlers by the time they run
    fn apply(
        &self,
        epoch: u64,
        next: ConnectionState,
        link: Option<Arc<HubLink>>,
        error: Option<SignalingError>,
    ) -> bool {
        let prev = {
            let mut slot = self.slot.lock();
            if slot.epoch != epoch || self.owner.is_cancelled() {
                return false;
            }
            if let Some(link) = link {
                slot.link = Some(link);
            }
            if next == ConnectionState::Connected {
                self.attempts.store(0, Ordering::SeqCst);
            }
            if error.is_some()
                || matches!(next, ConnectionState::Connecting | ConnectionState::Connected)
            {
                *self.last_error.lock() = error;
            }
            ConnectionState::from_u8(self.state.swap(next as u8, Ordering::SeqCst))
        };

        if prev != next {
            info!("Signaling state: {} -> {}", prev, next);
            self.listener.on_state_changed(next);
        }
        true
    }

    /// Remove `link` from the slot if it is still the live link of `epoch`
    fn release_if_current(&self, epoch: u64, link: &Arc<HubLink>) -> bool {
        let mut slot = self.slot.lock();
        if slot.epoch != epoch || self.owner.is_cancelled() {
            return false;
        }
        match &slot.link {
            Some(current) if Arc::ptr_eq(current, link) => {
                slot.link = None;
                true
            }
            _ => false,
        }
    }

    fn record_error(&self, epoch: u64, next: ConnectionState, error: SignalingError) {
        if self.apply(epoch, next, None, Some(error.clone())) {
            error!("Signaling error [{}]: {}", error.code(), error);
            self.listener.on_error(&error);
        }
    }

    async fn open_link(
        &self,
        room_id: &str,
        provider: &TokenProvider,
        scope: &CancellationToken,
    ) -> Result<(Arc<HubLink>, oneshot::Receiver<LinkClosed>), SignalingError> {
        let url = hub_url(&self.config.server_url, &self.config.hub_path, room_id)?;
        // Evaluated per attempt so refreshed tokens are picked up
        let token = provider();
        HubLink::open(
            &url,
            token,
            self.config.request_timeout,
            self.listener.clone(),
            scope.clone(),
        )
        .await
    }

    /// Retry with backoff until connected, superseded, or the policy gives up
    async fn reconnect(
        &self,
        epoch: u64,
        scope: &CancellationToken,
        mut reason: Option<String>,
    ) -> Option<(Arc<HubLink>, oneshot::Receiver<LinkClosed>)> {
        loop {
            let attempt = self.attempts.load(Ordering::SeqCst);
            let Some(delay) = self.config.reconnect.next_delay(attempt) else {
                warn!("Giving up after {} reconnect attempts", attempt);
                self.give_up(epoch, reason);
                return None;
            };

            if !self.transition(epoch, ConnectionState::Reconnecting, None) {
                return None;
            }
            info!("Reconnect attempt {} in {:?}", attempt + 1, delay);

            tokio::select! {
                _ = scope.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let (room_id, provider) = self.target()?;
            let result = tokio::select! {
                _ = scope.cancelled() => return None,
                r = self.open_link(&room_id, &provider, scope) => r,
            };

            match result {
                Ok((link, closed_rx)) => {
                    if self.transition(epoch, ConnectionState::Connected, Some(link.clone())) {
                        info!("Reconnected to room {}", room_id);
                        return Some((link, closed_rx));
                    }
                    let _ = link.close().await;
                    return None;
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                    reason = Some(e.to_string());
                    self.attempts.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    fn give_up(&self, epoch: u64, reason: Option<String>) {
        match reason {
            Some(reason) => self.record_error(
                epoch,
                ConnectionState::Disconnected,
                SignalingError::Disconnected(Some(reason)),
            ),
            None => {
                self.transition(epoch, ConnectionState::Disconnected, None);
            }
        }
    }
}

/// Watch a link for unexpected closure and drive reconnection
fn spawn_supervisor(
    inner: Arc<Inner>,
    epoch: u64,
    scope: CancellationToken,
    link: Arc<HubLink>,
    closed_rx: oneshot::Receiver<LinkClosed>,
) {
    tokio::spawn(async move {
        let mut link = link;
        let mut closed_rx = closed_rx;

        loop {
            let closure = tokio::select! {
                _ = scope.cancelled() => return,
                c = &mut closed_rx => c.unwrap_or(LinkClosed {
                    error: None,
                    allow_reconnect: true,
                }),
            };

            // A deliberate disconnect already took the link out of the slot
            if !inner.release_if_current(epoch, &link) {
                return;
            }
            drop(link);

            warn!(
                "Relay connection lost: {}",
                closure.error.as_deref().unwrap_or("no reason given")
            );

            if !closure.allow_reconnect {
                inner.give_up(epoch, closure.error);
                return;
            }

            match inner.reconnect(epoch, &scope, closure.error).await {
                Some((next_link, next_rx)) => {
                    link = next_link;
                    closed_rx = next_rx;
                }
                None => return,
            }
        }
    });
}

/// Client side of the relay connection
pub struct TransportClient {
    inner: Arc<Inner>,
}

impl TransportClient {
    /// Create a transport owned by its own root scope
    pub fn new(config: TransportConfig, listener: Arc<dyn TransportListener>) -> Self {
        Self::with_owner(config, listener, CancellationToken::new())
    }

    /// Create a transport bound to an owner scope. Once `owner` is
    /// cancelled no further state writes happen, even from operations
    /// that were already in flight. Shutting the transport down does not
    /// cancel `owner` itself.
    pub fn with_owner(
        config: TransportConfig,
        listener: Arc<dyn TransportListener>,
        owner: CancellationToken,
    ) -> Self {
        let owner = owner.child_token();
        let scope = owner.child_token();
        Self {
            inner: Arc::new(Inner {
                config,
                listener,
                owner,
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                attempts: AtomicU32::new(0),
                last_error: Mutex::new(None),
                slot: Mutex::new(LinkSlot {
                    epoch: 0,
                    link: None,
                    scope,
                    room_id: None,
                    token_provider: None,
                }),
            }),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Consecutive failed reconnect attempts in the current outage
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// The last error recorded by a failed connect or a lost connection
    pub fn last_error(&self) -> Option<SignalingError> {
        self.inner.last_error.lock().clone()
    }

    /// Room of the current (or most recent in-flight) connection
    pub fn room_id(&self) -> Option<String> {
        self.inner.slot.lock().room_id.clone()
    }

    pub fn owner_token(&self) -> CancellationToken {
        self.inner.owner.clone()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Connect to the relay for `room_id`.
    ///
    /// Does nothing when already connected. Failures never surface as a
    /// return value: the state becomes [`ConnectionState::Error`], the error
    /// is stored in [`last_error`](Self::last_error) and reported to the
    /// listener.
    pub async fn connect(&self, room_id: &str, token_provider: TokenProvider) {
        // A disconnect still tearing down has already taken the link
        if self.is_connected() && self.inner.slot.lock().link.is_some() {
            debug!("Already connected, ignoring connect for room {}", room_id);
            return;
        }
        if self.inner.owner.is_cancelled() {
            return;
        }

        let (epoch, scope, stale) = self
            .inner
            .begin_epoch(Some((room_id.to_string(), token_provider.clone())));
        if !self
            .inner
            .transition(epoch, ConnectionState::Connecting, None)
        {
            return;
        }
        if let Some(stale) = stale {
            if let Err(e) = stale.close().await {
                debug!("Closing superseded link: {}", e);
            }
        }

        info!("Connecting to room {}", room_id);
        let result = tokio::select! {
            _ = scope.cancelled() => {
                debug!("Connect to room {} superseded", room_id);
                return;
            }
            r = self.inner.open_link(room_id, &token_provider, &scope) => r,
        };

        match result {
            Ok((link, closed_rx)) => {
                if self
                    .inner
                    .transition(epoch, ConnectionState::Connected, Some(link.clone()))
                {
                    info!("Connected to room {}", room_id);
                    spawn_supervisor(self.inner.clone(), epoch, scope, link, closed_rx);
                } else {
                    debug!("Connect to room {} resolved after being superseded", room_id);
                    let _ = link.close().await;
                }
            }
            Err(e) => {
                self.inner
                    .record_error(epoch, ConnectionState::Error, e);
            }
        }
    }

    /// Disconnect from the relay.
    ///
    /// Cancels any pending reconnect timer and in-flight connect. Teardown
    /// failures are logged and swallowed; the state ends up
    /// [`ConnectionState::Disconnected`] unless a newer connect superseded
    /// this call.
    pub async fn disconnect(&self) {
        let (epoch, _scope, link) = self.inner.begin_epoch(None);

        if let Some(link) = link {
            if let Err(e) = link.close().await {
                warn!("Relay teardown failed: {}", e);
            }
        }

        self.inner
            .transition(epoch, ConnectionState::Disconnected, None);
    }

    /// Invoke a remote method and wait for its acknowledgment
    pub async fn invoke(
        &self,
        method: HubMethod,
        arguments: Vec<Value>,
    ) -> Result<Value, SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::NotConnected);
        }
        let link = self
            .inner
            .slot
            .lock()
            .link
            .clone()
            .ok_or(SignalingError::NotConnected)?;

        debug!("Invoking {}", method);
        link.invoke(method, arguments, self.inner.config.request_timeout)
            .await
    }

    /// Invoke a room-scoped method: the room id is sent as the first argument
    pub async fn invoke_in_room(
        &self,
        method: HubMethod,
        mut arguments: Vec<Value>,
    ) -> Result<Value, SignalingError> {
        if !self.is_connected() {
            return Err(SignalingError::NotConnected);
        }
        let room_id = self.room_id().ok_or(SignalingError::NotConnected)?;
        arguments.insert(0, Value::from(room_id));
        self.invoke(method, arguments).await
    }

    /// Tear down the owner scope: stops reconnection and suppresses every
    /// later state write. The link is closed in the background.
    pub fn shutdown(&self) {
        self.inner.owner.cancel();
        let link = {
            let mut slot = self.inner.slot.lock();
            slot.scope.cancel();
            slot.link.take()
        };
        if let Some(link) = link {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = link.close().await;
                });
            }
        }
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
