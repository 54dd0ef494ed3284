use std::{path::PathBuf, sync::Arc};

use clipsync_core::{
    CallError, ClipboardActivity, ClipboardDirection, Command, ConfigSnapshot, ConnectionPhase,
    InitialState, LogBuffer, LogEntry, MaterialEffect, PeerEntry, PushEvent, ThemeMode,
    TraySignal,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    bus::{DEFAULT_BUS_CAPACITY, EventBus},
    shell::{DesktopShell, SystemShell},
    store::ConfigStore,
    validate::validate_settings,
};

#[derive(Debug)]
struct HostInner {
    config: ConfigSnapshot,
    phase: ConnectionPhase,
    peers: Vec<PeerEntry>,
    logs: LogBuffer,
}

pub struct HostOptions {
    pub store: Option<ConfigStore>,
    pub log_dir: PathBuf,
    pub shell: Arc<dyn DesktopShell>,
    pub bus_capacity: usize,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            store: None,
            log_dir: PathBuf::from("logs"),
            shell: Arc::new(SystemShell),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

/// The authority: owns the configuration and connection state, executes the
/// command surface and publishes every change on the event bus.
///
/// Cloning is cheap and every clone refers to the same state.
#[derive(Clone)]
pub struct Host {
    inner: Arc<RwLock<HostInner>>,
    bus: EventBus,
    store: Option<ConfigStore>,
    shell: Arc<dyn DesktopShell>,
    log_dir: PathBuf,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("log_dir", &self.log_dir)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn new(options: HostOptions) -> Self {
        let config = options
            .store
            .as_ref()
            .map(ConfigStore::load_or_default)
            .unwrap_or_default();

        Self {
            inner: Arc::new(RwLock::new(HostInner {
                config,
                phase: ConnectionPhase::Idle,
                peers: Vec::new(),
                logs: LogBuffer::new(),
            })),
            bus: EventBus::new(options.bus_capacity),
            store: options.store,
            shell: options.shell,
            log_dir: options.log_dir,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn execute(&self, command: Command) -> Result<Value, CallError> {
        let name = command.name();
        debug!(command = name, "executing command");

        let result = match command {
            Command::GetInitialState => reply(self.initial_state().await),
            Command::SaveSettings { form } => self.save_settings(form).await.map(|()| Value::Null),
            Command::TogglePause => {
                self.toggle_pause().await;
                Ok(Value::Null)
            }
            Command::ApplyWindowEffects { effect, theme } => self
                .apply_window_effects(effect, theme)
                .map(|()| Value::Null),
            Command::OpenLogFolder => self.open_log_folder().map(|()| Value::Null),
            Command::GetHostname => reply(self.shell.hostname()),
            Command::ClearLogs => {
                self.inner.write().await.logs.clear();
                Ok(Value::Null)
            }
            Command::FrontendLog { level, message } => {
                frontend_log(&level, &message);
                Ok(Value::Null)
            }
        };

        if let Err(err) = &result {
            warn!(command = name, "command rejected: {}", err);
        }
        result
    }

    pub async fn initial_state(&self) -> InitialState {
        let inner = self.inner.read().await;
        InitialState {
            paused: inner.phase.is_paused(),
            config: inner.config.clone(),
            logs: Some(inner.logs.lines()),
        }
    }

    pub async fn config(&self) -> ConfigSnapshot {
        self.inner.read().await.config.clone()
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.inner.read().await.phase
    }

    pub async fn peers(&self) -> Vec<PeerEntry> {
        self.inner.read().await.peers.clone()
    }

    /// Validates, persists, applies and broadcasts a whole settings form.
    ///
    /// Persisting and applying happen under one write lock, so concurrent
    /// saves land on disk, in memory and on the bus in the same order.
    pub async fn save_settings(&self, form: ConfigSnapshot) -> Result<(), CallError> {
        let config = validate_settings(form)?;

        let paused = {
            let mut inner = self.inner.write().await;
            if let Some(store) = &self.store {
                persist(store.clone(), config.clone()).await?;
            }

            inner.config = config.clone();
            if !config.is_lan() && !inner.peers.is_empty() {
                inner.peers.clear();
                self.bus.publish(&PushEvent::LanPeersChanged(Vec::new()));
            }
            self.bus.publish(&PushEvent::ConfigChanged(inner.config.clone()));
            inner.phase.is_paused()
        };

        if !paused {
            self.connect().await;
        }

        info!(mode = %config.connection_mode, "settings saved");
        self.log("INFO", "Settings saved").await;
        Ok(())
    }

    pub async fn toggle_pause(&self) {
        if self.phase().await.is_paused() {
            self.resume().await;
        } else {
            self.pause().await;
        }
    }

    /// Brings the connection up from `Idle`.
    pub async fn start(&self) {
        self.connect().await;
    }

    pub async fn pause(&self) {
        self.set_phase(ConnectionPhase::Paused).await;
        self.status("Paused");
        self.log("INFO", "Sync paused").await;
    }

    pub async fn resume(&self) {
        self.connect().await;
        self.log("INFO", "Sync resumed").await;
    }

    async fn connect(&self) {
        let lan = self.inner.read().await.config.is_lan();
        self.set_phase(ConnectionPhase::Connecting).await;
        self.status(if lan {
            "Starting LAN discovery"
        } else {
            "Connecting to server"
        });
        self.set_phase(ConnectionPhase::Connected).await;
        self.status(if lan { "LAN discovery active" } else { "Connected" });
    }

    /// Records a transition reported by the connection runtime.
    pub async fn set_phase(&self, phase: ConnectionPhase) {
        let mut inner = self.inner.write().await;
        inner.phase = phase;
        self.bus.publish(&PushEvent::ConnectionState(phase.to_state()));
    }

    pub fn status(&self, text: &str) {
        self.bus.publish(&PushEvent::StatusUpdate(text.to_owned()));
    }

    /// Reports a clipboard transfer made by the sync runtime.
    pub fn clipboard_activity(&self, direction: ClipboardDirection, content_type: &str) {
        let activity = ClipboardActivity {
            direction,
            content_type: content_type.to_owned(),
        };
        debug!(?direction, content_type, "clipboard activity");
        self.status(&activity.status_text());
        self.bus.publish(&PushEvent::ClipboardEvent(activity));
    }

    /// Replaces the LAN roster. Ignored outside LAN mode.
    pub async fn set_lan_peers(&self, peers: Vec<PeerEntry>) {
        let mut inner = self.inner.write().await;
        if !inner.config.is_lan() {
            debug!(count = peers.len(), "ignoring peer roster outside LAN mode");
            return;
        }
        inner.peers = peers;
        self.bus
            .publish(&PushEvent::LanPeersChanged(inner.peers.clone()));
    }

    pub async fn log(&self, level: &str, message: &str) {
        let entry = LogEntry::new(level, message);
        let mut inner = self.inner.write().await;
        inner.logs.push(entry.clone());
        self.bus.publish(&PushEvent::LogEntry(entry));
    }

    /// Handles a tray menu signal. The signal is published on its own topic
    /// and then acted on like the equivalent command.
    pub async fn apply_tray_signal(&self, signal: TraySignal) {
        self.bus.publish(&PushEvent::Tray(signal));
        let paused = self.phase().await.is_paused();
        match signal {
            TraySignal::Pause if !paused => self.pause().await,
            TraySignal::Resume if paused => self.resume().await,
            TraySignal::Pause | TraySignal::Resume => {}
            TraySignal::Sync => self.republish().await,
        }
    }

    /// Re-publishes the full current state on every state topic.
    pub async fn republish(&self) {
        let inner = self.inner.read().await;
        self.bus.publish(&PushEvent::ConfigChanged(inner.config.clone()));
        self.bus
            .publish(&PushEvent::ConnectionState(inner.phase.to_state()));
        if inner.config.is_lan() {
            self.bus
                .publish(&PushEvent::LanPeersChanged(inner.peers.clone()));
        }
    }

    fn apply_window_effects(&self, effect: MaterialEffect, theme: ThemeMode) -> Result<(), CallError> {
        self.shell
            .apply_window_effects(effect, theme)
            .map_err(CallError::Command)
    }

    fn open_log_folder(&self) -> Result<(), CallError> {
        if !self.log_dir.exists() {
            debug!(path = %self.log_dir.display(), "log folder does not exist yet");
            return Ok(());
        }
        self.shell
            .open_folder(&self.log_dir)
            .map_err(|err| CallError::Command(format!("Failed to open log folder: {err}")))
    }
}

async fn persist(store: ConfigStore, config: ConfigSnapshot) -> Result<(), CallError> {
    let saved = tokio::task::spawn_blocking(move || store.save_with_retry(&config))
        .await
        .map_err(|err| CallError::Command(format!("Save error: {err}")))?;
    saved.map_err(|err| CallError::Command(format!("Save error: {err}")))
}

/// Writes a line reported by a window under the `frontend` target.
fn frontend_log(level: &str, message: &str) {
    match level.to_ascii_lowercase().as_str() {
        "error" => error!(target: "frontend", "{}", message),
        "warn" => warn!(target: "frontend", "{}", message),
        "debug" => debug!(target: "frontend", "{}", message),
        _ => info!(target: "frontend", "{}", message),
    }
}

fn reply<T: Serialize>(value: T) -> Result<Value, CallError> {
    serde_json::to_value(value).map_err(|err| CallError::MalformedReply(err.to_string()))
}
