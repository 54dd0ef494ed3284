use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    CallError, CoreError,
    model::{
        ClipboardActivity, ConfigSnapshot, ConnectionState, LogEntry, MaterialEffect, PeerEntry,
        ThemeMode,
    },
};

/// Named request understood by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    GetInitialState,
    SaveSettings {
        form: ConfigSnapshot,
    },
    TogglePause,
    ApplyWindowEffects {
        effect: MaterialEffect,
        theme: ThemeMode,
    },
    OpenLogFolder,
    GetHostname,
    ClearLogs,
    /// A window's own log line, written to the host's log.
    FrontendLog {
        level: String,
        message: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetInitialState => "get_initial_state",
            Command::SaveSettings { .. } => "save_settings",
            Command::TogglePause => "toggle_pause",
            Command::ApplyWindowEffects { .. } => "apply_window_effects",
            Command::OpenLogFolder => "open_log_folder",
            Command::GetHostname => "get_hostname",
            Command::ClearLogs => "clear_logs",
            Command::FrontendLog { .. } => "frontend_log",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    StatusUpdate,
    ConnectionState,
    ConfigChanged,
    LanPeersChanged,
    LogEntry,
    ClipboardEvent,
    Sync,
    Pause,
    Resume,
}

impl Topic {
    /// Topics every window mirror listens to.
    pub const STATE: [Topic; 4] = [
        Topic::StatusUpdate,
        Topic::ConnectionState,
        Topic::ConfigChanged,
        Topic::LanPeersChanged,
    ];

    pub const TRAY: [Topic; 3] = [Topic::Sync, Topic::Pause, Topic::Resume];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::StatusUpdate => "status-update",
            Topic::ConnectionState => "connection-state",
            Topic::ConfigChanged => "config-changed",
            Topic::LanPeersChanged => "lan-peers-changed",
            Topic::LogEntry => "log-entry",
            Topic::ClipboardEvent => "clipboard-event",
            Topic::Sync => "sync",
            Topic::Pause => "pause",
            Topic::Resume => "resume",
        }
    }

    pub fn is_tray_signal(self) -> bool {
        Topic::TRAY.contains(&self)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as it travels on the bus: topic plus untyped payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    pub topic: Topic,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraySignal {
    Sync,
    Pause,
    Resume,
}

impl TraySignal {
    pub fn topic(self) -> Topic {
        match self {
            TraySignal::Sync => Topic::Sync,
            TraySignal::Pause => Topic::Pause,
            TraySignal::Resume => Topic::Resume,
        }
    }
}

/// Typed view of a [`RawEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    StatusUpdate(String),
    ConnectionState(ConnectionState),
    ConfigChanged(ConfigSnapshot),
    LanPeersChanged(Vec<PeerEntry>),
    LogEntry(LogEntry),
    ClipboardEvent(ClipboardActivity),
    Tray(TraySignal),
}

impl PushEvent {
    pub fn topic(&self) -> Topic {
        match self {
            PushEvent::StatusUpdate(_) => Topic::StatusUpdate,
            PushEvent::ConnectionState(_) => Topic::ConnectionState,
            PushEvent::ConfigChanged(_) => Topic::ConfigChanged,
            PushEvent::LanPeersChanged(_) => Topic::LanPeersChanged,
            PushEvent::LogEntry(_) => Topic::LogEntry,
            PushEvent::ClipboardEvent(_) => Topic::ClipboardEvent,
            PushEvent::Tray(signal) => signal.topic(),
        }
    }

    pub fn decode(event: &RawEvent) -> Result<Self, CoreError> {
        let topic = event.topic;
        let malformed = |err: serde_json::Error| CoreError::MalformedPayload {
            topic,
            reason: err.to_string(),
        };

        match topic {
            Topic::StatusUpdate => serde_json::from_value(event.payload.clone())
                .map(PushEvent::StatusUpdate)
                .map_err(malformed),
            Topic::ConnectionState => serde_json::from_value(event.payload.clone())
                .map(PushEvent::ConnectionState)
                .map_err(malformed),
            Topic::ConfigChanged => serde_json::from_value(event.payload.clone())
                .map(PushEvent::ConfigChanged)
                .map_err(malformed),
            Topic::LanPeersChanged => decode_roster(&event.payload).map(PushEvent::LanPeersChanged),
            Topic::LogEntry => serde_json::from_value(event.payload.clone())
                .map(PushEvent::LogEntry)
                .map_err(malformed),
            Topic::ClipboardEvent => serde_json::from_value(event.payload.clone())
                .map(PushEvent::ClipboardEvent)
                .map_err(malformed),
            Topic::Sync => Ok(PushEvent::Tray(TraySignal::Sync)),
            Topic::Pause => Ok(PushEvent::Tray(TraySignal::Pause)),
            Topic::Resume => Ok(PushEvent::Tray(TraySignal::Resume)),
        }
    }

    pub fn encode(&self) -> Result<RawEvent, CoreError> {
        let to_value = |value: Result<Value, serde_json::Error>| {
            value.map_err(|err| CoreError::Serialization(err.to_string()))
        };
        let payload = match self {
            PushEvent::StatusUpdate(text) => Value::String(text.clone()),
            PushEvent::ConnectionState(state) => to_value(serde_json::to_value(state))?,
            PushEvent::ConfigChanged(config) => to_value(serde_json::to_value(config))?,
            PushEvent::LanPeersChanged(peers) => Value::String(encode_roster(peers)?),
            PushEvent::LogEntry(entry) => to_value(serde_json::to_value(entry))?,
            PushEvent::ClipboardEvent(activity) => to_value(serde_json::to_value(activity))?,
            PushEvent::Tray(_) => Value::Null,
        };
        Ok(RawEvent {
            topic: self.topic(),
            payload,
        })
    }
}

/// Serialises a roster the way `lan-peers-changed` carries it: a JSON array
/// encoded inside a JSON string.
pub fn encode_roster(peers: &[PeerEntry]) -> Result<String, CoreError> {
    serde_json::to_string(peers).map_err(|err| CoreError::Serialization(err.to_string()))
}

/// Accepts the string-encoded form and, leniently, a bare array.
pub fn decode_roster(payload: &Value) -> Result<Vec<PeerEntry>, CoreError> {
    let topic = Topic::LanPeersChanged;
    let parsed = match payload {
        Value::String(encoded) => serde_json::from_str::<Vec<PeerEntry>>(encoded),
        Value::Array(_) => serde_json::from_value::<Vec<PeerEntry>>(payload.clone()),
        other => {
            return Err(CoreError::MalformedPayload {
                topic,
                reason: format!("expected encoded peer array, got {other}"),
            });
        }
    };
    parsed.map_err(|err| CoreError::MalformedPayload {
        topic,
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Ok { value: Value },
    Err { message: String },
}

impl CallOutcome {
    pub fn into_result(self) -> Result<Value, CallError> {
        match self {
            CallOutcome::Ok { value } => Ok(value),
            CallOutcome::Err { message } => Err(CallError::Command(message)),
        }
    }
}

impl From<Result<Value, CallError>> for CallOutcome {
    fn from(result: Result<Value, CallError>) -> Self {
        match result {
            Ok(value) => CallOutcome::Ok { value },
            Err(err) => CallOutcome::Err {
                message: err.to_string(),
            },
        }
    }
}

/// Frames sent by a window to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientFrame {
    Call { id: u64, request: Command },
}

/// Frames sent by the host to a window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostFrame {
    Reply { id: u64, outcome: CallOutcome },
    Event { event: RawEvent },
    /// The connection fell behind the host's bus and `skipped` events were dropped.
    Missed { skipped: u64 },
}

pub fn encode_frame<T: Serialize>(frame: &T) -> Result<String, CoreError> {
    serde_json::to_string(frame).map_err(|err| CoreError::Serialization(err.to_string()))
}

pub fn decode_frame<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, CoreError> {
    serde_json::from_str(text).map_err(|err| CoreError::Serialization(err.to_string()))
}
