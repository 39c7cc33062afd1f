use serde::{Deserialize, Serialize};
use std::fmt;

/// A discovered or remembered peripheral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Platform address / identifier
    pub id: String,
    /// Advertised name, if any
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}

/// Audio/processing lifecycle, independent of the link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
    Processing,
    Responding,
}

/// How the watch captured the audio session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AudioMode {
    /// Spoken request, `START_V`
    Voice,
    /// Silent request, `START_S`
    Silent,
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voice => write!(f, "VOICE"),
            Self::Silent => write!(f, "SILENT"),
        }
    }
}

/// A closed audio session, chunks already concatenated in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAudio {
    pub bytes: Vec<u8>,
    pub mode: AudioMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionState(ConnectionState),
    VoiceState(VoiceState),
    DeviceFound(DeviceHandle),
    AudioReceived { bytes: usize, mode: AudioMode },
    Transcription(String),
    AssistantReply(String),
    PersonaUpdated(String),
    LogMessage(StatusMessage),
}

/// Commands accepted by the service loop
#[derive(Debug, Clone)]
pub enum BluetoothCommand {
    StartScan,
    Connect(String),
    Disconnect,
    SyncTime,
    SendText(String),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
