//! Periodic liveness ping
//!
//! Heartbeats are diagnostic. A heartbeat while disconnected is a silent
//! no-op and every failure is swallowed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::connection::TransportClient;
use super::error::SignalingError;
use crate::protocol::HubMethod;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Send one heartbeat.
///
/// Always `Ok`: the call is skipped while not connected, and a rejected or
/// unacknowledged heartbeat is only logged.
pub async fn send_heartbeat(transport: &TransportClient) -> Result<(), SignalingError> {
    ping(transport).await;
    Ok(())
}

/// Returns whether the relay acknowledged the heartbeat
async fn ping(transport: &TransportClient) -> bool {
    if !transport.is_connected() {
        trace!("Skipping heartbeat while {}", transport.state());
        return false;
    }
    match transport
        .invoke_in_room(HubMethod::SendHeartbeat, vec![])
        .await
    {
        Ok(_) => true,
        Err(e) => {
            debug!("Heartbeat failed [{}]: {}", e.code(), e);
            false
        }
    }
}

/// Background heartbeat task bound to a transport's owner scope
pub struct HeartbeatScheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    sent: Arc<AtomicU64>,
}

impl HeartbeatScheduler {
    /// Start pinging every `period`. The first heartbeat goes out after one
    /// full period.
    pub fn start(transport: Arc<TransportClient>, period: Duration) -> Self {
        let cancel = transport.owner_token().child_token();
        let sent = Arc::new(AtomicU64::new(0));

        let token = cancel.clone();
        let counter = sent.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if ping(&transport).await {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        Self {
            cancel,
            handle: Some(handle),
            sent,
        }
    }

    /// Heartbeats acknowledged by the relay so far
    pub fn heartbeats_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
