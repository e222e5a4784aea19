//! Remote method and event names used on the hub

use std::fmt;

/// Client -> relay operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    JoinRoom,
    LeaveRoom,
    SendOffer,
    SendAnswer,
    SendIceCandidate,
    MediaStateChanged,
    ToggleCamera,
    ToggleMicrophone,
    StartScreenShare,
    StopScreenShare,
    SendHeartbeat,
    SendE2EEMessage,
}

impl HubMethod {
    pub const ALL: [HubMethod; 12] = [
        Self::JoinRoom,
        Self::LeaveRoom,
        Self::SendOffer,
        Self::SendAnswer,
        Self::SendIceCandidate,
        Self::MediaStateChanged,
        Self::ToggleCamera,
        Self::ToggleMicrophone,
        Self::StartScreenShare,
        Self::StopScreenShare,
        Self::SendHeartbeat,
        Self::SendE2EEMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoinRoom => "JoinRoom",
            Self::LeaveRoom => "LeaveRoom",
            Self::SendOffer => "SendOffer",
            Self::SendAnswer => "SendAnswer",
            Self::SendIceCandidate => "SendIceCandidate",
            Self::MediaStateChanged => "MediaStateChanged",
            Self::ToggleCamera => "ToggleCamera",
            Self::ToggleMicrophone => "ToggleMicrophone",
            Self::StartScreenShare => "StartScreenShare",
            Self::StopScreenShare => "StopScreenShare",
            Self::SendHeartbeat => "SendHeartbeat",
            Self::SendE2EEMessage => "SendE2EEMessage",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for HubMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relay -> client events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEvent {
    RoomJoined,
    UserJoined,
    UserLeft,
    ReceiveOffer,
    ReceiveAnswer,
    ReceiveIceCandidate,
    CallEnded,
    MediaStateChanged,
    CameraToggled,
    MicrophoneToggled,
    ScreenShareStarted,
    ScreenShareStopped,
    HeartbeatAck,
    ReceiveE2EEMessage,
    /// Legacy point-to-point key exchange
    ReceiveKeyOffer,
    /// Legacy point-to-point key exchange
    ReceiveKeyAnswer,
    /// Legacy point-to-point key exchange
    ReceiveKeyRotation,
}

impl HubEvent {
    pub const ALL: [HubEvent; 17] = [
        Self::RoomJoined,
        Self::UserJoined,
        Self::UserLeft,
        Self::ReceiveOffer,
        Self::ReceiveAnswer,
        Self::ReceiveIceCandidate,
        Self::CallEnded,
        Self::MediaStateChanged,
        Self::CameraToggled,
        Self::MicrophoneToggled,
        Self::ScreenShareStarted,
        Self::ScreenShareStopped,
        Self::HeartbeatAck,
        Self::ReceiveE2EEMessage,
        Self::ReceiveKeyOffer,
        Self::ReceiveKeyAnswer,
        Self::ReceiveKeyRotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomJoined => "RoomJoined",
            Self::UserJoined => "UserJoined",
            Self::UserLeft => "UserLeft",
            Self::ReceiveOffer => "ReceiveOffer",
            Self::ReceiveAnswer => "ReceiveAnswer",
            Self::ReceiveIceCandidate => "ReceiveIceCandidate",
            Self::CallEnded => "CallEnded",
            Self::MediaStateChanged => "MediaStateChanged",
            Self::CameraToggled => "CameraToggled",
            Self::MicrophoneToggled => "MicrophoneToggled",
            Self::ScreenShareStarted => "ScreenShareStarted",
            Self::ScreenShareStopped => "ScreenShareStopped",
            Self::HeartbeatAck => "HeartbeatAck",
            Self::ReceiveE2EEMessage => "ReceiveE2EEMessage",
            Self::ReceiveKeyOffer => "ReceiveKeyOffer",
            Self::ReceiveKeyAnswer => "ReceiveKeyAnswer",
            Self::ReceiveKeyRotation => "ReceiveKeyRotation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl fmt::Display for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
