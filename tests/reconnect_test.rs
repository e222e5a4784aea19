//! Reconnection and connection lifecycle tests
//!
//! Covers server-initiated closes (with and without reconnect permission),
//! giving up after the policy's attempt limit, token refresh per attempt and
//! overlapping connect/disconnect calls.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use callsignal::network::{
    ConnectionState, ReconnectPolicy, RelayServer, SignalingError, SignalingHandlers,
    SignalingRouter, TokenProvider, TransportConfig,
};

const ROOM: &str = "standup";

/// Find an available port for testing
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Helper to start a relay in background
async fn start_test_server(port: u16) -> (RelayServer, tokio::task::JoinHandle<()>) {
    let addr = format!("127.0.0.1:{}", port);
    let server = RelayServer::new();
    let running = server.clone();

    let handle = tokio::spawn(async move {
        let _ = running.run(&addr).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (server, handle)
}

fn test_config(port: u16, max_attempts: Option<u32>) -> TransportConfig {
    let mut config = TransportConfig::new(&format!("ws://127.0.0.1:{}", port));
    config.reconnect = ReconnectPolicy::from_millis(&[50], max_attempts);
    config.request_timeout = Duration::from_secs(2);
    config
}

fn token(user: &str) -> TokenProvider {
    let user = user.to_string();
    Arc::new(move || Some(user.clone()))
}

struct Probe {
    states: mpsc::UnboundedReceiver<ConnectionState>,
    errors: mpsc::UnboundedReceiver<SignalingError>,
}

fn probed_handlers() -> (SignalingHandlers, Probe) {
    let (states_tx, states) = mpsc::unbounded_channel();
    let (errors_tx, errors) = mpsc::unbounded_channel();

    let handlers = SignalingHandlers::new()
        .on_state_changed(move |state| {
            let _ = states_tx.send(state);
        })
        .on_error(move |error| {
            let _ = errors_tx.send(error);
        });

    (handlers, Probe { states, errors })
}

/// Wait until `state` is reported, returning every state seen on the way
async fn wait_for_state(probe: &mut Probe, state: ConnectionState) -> Vec<ConnectionState> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        loop {
            let next = probe.states.recv().await.expect("State channel closed");
            seen.push(next);
            if next == state {
                return seen;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {}", state))
}

async fn wait_for_connections(server: &RelayServer, expected: usize) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while server.connection_count().await != expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Relay never reached {} connections", expected));
}

/// Test: Reconnect after a server close that allows it
/// Given a connected client
/// When the relay closes the room with reconnect allowed
/// Then the client goes Reconnecting → Connected and can call again
#[tokio::test]
async fn test_reconnect_after_server_close() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);
    router.connect(ROOM, token("alice")).await;
    router.join_room().await.expect("Failed to join room");
    wait_for_state(&mut probe, ConnectionState::Connected).await;

    let closed = server.disconnect_room(ROOM, Some("maintenance"), true).await;
    assert_eq!(closed, 1);

    let seen = wait_for_state(&mut probe, ConnectionState::Connected).await;
    assert_eq!(
        seen,
        vec![ConnectionState::Reconnecting, ConnectionState::Connected]
    );
    assert_eq!(router.transport().reconnect_attempts(), 0);
    assert!(router.transport().last_error().is_none());

    wait_for_connections(&server, 1).await;

    // The room membership is not restored automatically
    assert!(server.participants(ROOM).await.is_empty());
    router.join_room().await.expect("Failed to rejoin room");
    assert_eq!(server.participants(ROOM).await.len(), 1);

    router.disconnect().await;
    server_handle.abort();
}

/// Test: Server close that forbids reconnecting
/// Given a connected client
/// When the relay closes the room with reconnect disallowed
/// Then the client ends Disconnected with a SIGNALING_DISCONNECTED error
#[tokio::test]
async fn test_close_without_reconnect() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);
    router.connect(ROOM, token("alice")).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;

    server.disconnect_room(ROOM, Some("kicked"), false).await;

    let seen = wait_for_state(&mut probe, ConnectionState::Disconnected).await;
    assert!(!seen.contains(&ConnectionState::Reconnecting));

    let error = probe.errors.recv().await.expect("No error reported");
    assert_eq!(error, SignalingError::Disconnected(Some("kicked".to_string())));
    assert_eq!(error.code(), "SIGNALING_DISCONNECTED");
    assert_eq!(router.transport().last_error(), Some(error));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(router.state(), ConnectionState::Disconnected);

    server_handle.abort();
}

/// Test: Give up after the attempt limit
/// Given a client limited to two reconnect attempts
/// When the relay goes away for good
/// Then the client retries twice and settles Disconnected with an error
#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, Some(2)), handlers);
    router.connect(ROOM, token("alice")).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;

    server.shutdown();
    let _ = server_handle.await;

    let seen = wait_for_state(&mut probe, ConnectionState::Disconnected).await;
    assert_eq!(seen.first(), Some(&ConnectionState::Reconnecting));
    assert!(!seen.contains(&ConnectionState::Connected));
    assert_eq!(router.transport().reconnect_attempts(), 2);

    let error = probe.errors.recv().await.expect("No error reported");
    assert!(matches!(error, SignalingError::Disconnected(Some(_))));
    assert_eq!(error.code(), "SIGNALING_DISCONNECTED");
}

/// Test: Token provider is consulted on every attempt
/// Given a client whose token provider counts calls
/// When the connection is dropped and re-established
/// Then the provider was called once per handshake
#[tokio::test]
async fn test_token_refreshed_per_attempt() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let provider: TokenProvider = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Some("alice".to_string())
    });

    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);
    router.connect(ROOM, provider).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.disconnect_room(ROOM, None, true).await;
    wait_for_state(&mut probe, ConnectionState::Reconnecting).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    router.disconnect().await;
    server_handle.abort();
}

/// Test: Connect while connected
/// Given a connected client
/// When connect is called again
/// Then nothing changes and no second connection is opened
#[tokio::test]
async fn test_connect_when_connected_is_noop() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);
    router.connect(ROOM, token("alice")).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;

    router.connect("another-room", token("alice")).await;

    assert_eq!(router.state(), ConnectionState::Connected);
    assert_eq!(router.room_id().as_deref(), Some(ROOM));
    wait_for_connections(&server, 1).await;
    assert!(probe.states.try_recv().is_err());

    router.disconnect().await;
    server_handle.abort();
}

/// Test: Disconnect racing an in-flight connect
/// Given a connect that has not finished its handshake
/// When disconnect is called before the handshake completes
/// Then the client ends Disconnected and the relay holds no connection
#[tokio::test]
async fn test_disconnect_during_connect() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, _probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);

    let connecting = router.connect(ROOM, token("alice"));
    tokio::pin!(connecting);
    assert!(futures_util::poll!(connecting.as_mut()).is_pending());
    assert_eq!(router.state(), ConnectionState::Connecting);

    router.disconnect().await;
    connecting.await;

    assert_eq!(router.state(), ConnectionState::Disconnected);
    wait_for_connections(&server, 0).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(router.state(), ConnectionState::Disconnected);

    server_handle.abort();
}

/// Test: Connect racing an in-flight disconnect
/// Given a disconnect still waiting for the old connection to close
/// When connect is called before the teardown finishes
/// Then the connect wins and the client ends Connected
#[tokio::test]
async fn test_connect_during_disconnect() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);
    router.connect(ROOM, token("alice")).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;

    let teardown = router.disconnect();
    tokio::pin!(teardown);
    assert!(futures_util::poll!(teardown.as_mut()).is_pending());

    router.connect(ROOM, token("alice")).await;
    assert_eq!(router.state(), ConnectionState::Connected);

    teardown.await;
    assert_eq!(router.state(), ConnectionState::Connected);

    wait_for_connections(&server, 1).await;
    router.join_room().await.expect("Join after reconnect failed");
    assert_eq!(server.participants(ROOM).await.len(), 1);

    router.disconnect().await;
    server_handle.abort();
}

/// Test: Repeated connect/disconnect cycles
/// Given a relay
/// When a client connects and disconnects several times in a row
/// Then every cycle ends in the expected state and no connection leaks
#[tokio::test]
async fn test_connect_disconnect_cycles() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let (handlers, _probe) = probed_handlers();
    let router = SignalingRouter::new(test_config(port, None), handlers);

    for _ in 0..5 {
        router.connect(ROOM, token("alice")).await;
        assert_eq!(router.state(), ConnectionState::Connected);
        router.disconnect().await;
        assert_eq!(router.state(), ConnectionState::Disconnected);
    }

    wait_for_connections(&server, 0).await;
    server_handle.abort();
}

/// Test: Owner scope cancellation freezes the client
/// Given a connected client bound to an owner scope
/// When the owner is cancelled and the relay then drops the connection
/// Then no further state changes are reported
#[tokio::test]
async fn test_owner_cancel_suppresses_state_writes() {
    let port = find_available_port();
    let (server, server_handle) = start_test_server(port).await;

    let owner = CancellationToken::new();
    let (handlers, mut probe) = probed_handlers();
    let router = SignalingRouter::with_owner(test_config(port, None), handlers, owner.clone());
    router.connect(ROOM, token("alice")).await;
    wait_for_state(&mut probe, ConnectionState::Connected).await;

    owner.cancel();
    server.disconnect_room(ROOM, Some("maintenance"), true).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(probe.states.try_recv().is_err());
    assert!(probe.errors.try_recv().is_err());

    router.disconnect().await;
    assert!(probe.states.try_recv().is_err());

    server_handle.abort();
}
