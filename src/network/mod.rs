//! Network module for call signaling
//!
//! Handles the relay connection, event routing, media-state and E2EE key
//! exchange messaging, heartbeats and peer-connection quality sampling.

mod connection;
mod e2ee;
mod error;
mod heartbeat;
mod media;
mod quality;
mod reconnect;
mod relay;
mod signaling;

pub use connection::{
    hub_url, ConnectionState, TokenProvider, TransportClient, TransportConfig,
    TransportListener, DEFAULT_HUB_PATH, DEFAULT_REQUEST_TIMEOUT,
};
pub use e2ee::{
    E2EEInboundMessage, E2EEMessageBridge, E2EEMessageType, E2EEOperationResult,
    E2EEOutboundMessage, E2EE_NOT_CONNECTED, E2EE_SEND_FAILED,
};
pub use error::{SignalingError, SignalingErrorKind};
pub use heartbeat::{send_heartbeat, HeartbeatScheduler, DEFAULT_HEARTBEAT_INTERVAL};
pub use media::{MediaStateCoordinator, MediaType};
pub use quality::{
    grade, quality_score, CandidatePairState, CandidatePairStats, InboundRtpStats, MediaKind,
    MonitorState, NetworkQuality, NetworkQualityMonitor, NetworkQualityStats,
    PeerConnectionStats, PeerTransportState, QualityChange, QualityChangedCallback,
    QualityEstimator, QualityInputs, QualityUpdate, RtcStat, StatsCallback, StatsError,
    StatsReport, StreamQualityStats, DEFAULT_SAMPLE_INTERVAL,
};
pub use reconnect::{ReconnectPolicy, DEFAULT_RECONNECT_DELAYS_MS};
pub use relay::{RelayError, RelayServer, E2EE_USER_NOT_FOUND};
pub use signaling::{
    AnswerEvent, CallEndedEvent, HeartbeatAck, IceCandidateEvent, MediaStateEvent,
    MediaToggleEvent, OfferEvent, RoomJoined, RoomParticipant, SignalingEvent,
    SignalingHandlers, SignalingRouter, UserEvent,
};
