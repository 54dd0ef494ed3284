use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "wss://example.com/ws";
pub const DEFAULT_MAX_IMAGE_KB: u64 = 512;
pub const MIN_IMAGE_KB: u64 = 1;
pub const MAX_IMAGE_KB: u64 = 524_288;

pub type DeviceId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    #[default]
    Server,
    Lan,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionMode::Server => "server",
            ConnectionMode::Lan => "lan",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CloseBehavior {
    #[default]
    MinimizeToTray,
    Minimize,
    Quit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialEffect {
    #[default]
    Acrylic,
    Mica,
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

/// Display language preference. Serialised as `"system"` or a locale tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    System,
    Locale(String),
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("system") {
            Language::System
        } else {
            Language::Locale(trimmed.to_owned())
        }
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        match value {
            Language::System => "system".to_owned(),
            Language::Locale(tag) => tag,
        }
    }
}

/// The authoritative settings record. Windows only ever hold cached copies.
///
/// Server credentials stay in the record while LAN mode is active (and vice
/// versa); only the fields of the active mode are validated on save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub connection_mode: ConnectionMode,
    pub server_url: String,
    pub token: String,
    pub username: String,
    pub password: String,
    pub lan_device_name: String,
    pub close_behavior: CloseBehavior,
    pub material_effect: MaterialEffect,
    pub theme_mode: ThemeMode,
    pub max_image_kb: u64,
    pub language: Language,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::Server,
            server_url: DEFAULT_SERVER_URL.to_owned(),
            token: String::new(),
            username: String::new(),
            password: String::new(),
            lan_device_name: String::new(),
            close_behavior: CloseBehavior::MinimizeToTray,
            material_effect: MaterialEffect::Acrylic,
            theme_mode: ThemeMode::System,
            max_image_kb: DEFAULT_MAX_IMAGE_KB,
            language: Language::System,
        }
    }
}

impl ConfigSnapshot {
    pub fn is_lan(&self) -> bool {
        self.connection_mode == ConnectionMode::Lan
    }

    pub fn clamped_max_image_kb(&self) -> u64 {
        self.max_image_kb.clamp(MIN_IMAGE_KB, MAX_IMAGE_KB)
    }
}

/// Payload of the `connection-state` topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionState {
    pub paused: bool,
    pub state: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Paused,
}

impl ConnectionPhase {
    pub fn is_paused(self) -> bool {
        matches!(self, ConnectionPhase::Idle | ConnectionPhase::Paused)
    }

    pub fn to_state(self) -> ConnectionState {
        ConnectionState {
            paused: self.is_paused(),
            state: self.to_string(),
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Idle => "Idle",
            ConnectionPhase::Connecting => "Connecting",
            ConnectionPhase::Connected => "Connected",
            ConnectionPhase::Reconnecting => "Reconnecting",
            ConnectionPhase::Disconnected => "Disconnected",
            ConnectionPhase::Paused => "Paused",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerEntry {
    pub device_id: DeviceId,
    pub device_name: String,
    pub addr: String,
    #[serde(default)]
    pub tcp_port: u16,
    /// Unix seconds. Informational only; liveness is decided by the host.
    #[serde(default)]
    pub last_seen: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardDirection {
    Sent,
    Received,
}

/// One clipboard transfer reported by the sync runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipboardActivity {
    #[serde(rename = "type")]
    pub direction: ClipboardDirection,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

impl ClipboardActivity {
    /// Status line shown alongside the activity.
    pub fn status_text(&self) -> String {
        match self.direction {
            ClipboardDirection::Sent => format!("Broadcasting clipboard ({})", self.content_type),
            ClipboardDirection::Received => {
                format!("Received remote clipboard ({})", self.content_type)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub line: String,
    pub level: String,
}

impl LogEntry {
    pub fn new(level: impl Into<String>, message: &str) -> Self {
        let level = level.into();
        Self {
            line: format!("[{level}] {message}"),
            level,
        }
    }

    /// Rebuilds an entry from a stored `[LEVEL] message` line.
    pub fn from_line(line: impl Into<String>) -> Self {
        let line = line.into();
        let level = line
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .map(|(level, _)| level.to_owned())
            .unwrap_or_else(|| "INFO".to_owned());
        Self { line, level }
    }
}

/// Reply of `get_initial_state`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitialState {
    pub paused: bool,
    pub config: ConfigSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WindowLabel {
    Main,
    Settings,
}

impl WindowLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowLabel::Main => "main",
            WindowLabel::Settings => "settings",
        }
    }
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
