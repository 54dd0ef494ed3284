//! Per-window cached copy of the host's state.

use clipsync_core::{
    ClipboardActivity, ConfigSnapshot, ConnectionMode, Delivery, InitialState,
    LOG_BUFFER_CAPACITY, LogBuffer, LogEntry, PushEvent, RawEvent, Topic,
};
use tracing::{debug, warn};

use crate::peers::{PeerRoster, panel_visible};

/// Pushes held back while a bootstrap is outstanding. Past this the queue is
/// dropped and a fresh bootstrap requested.
pub const MAX_QUEUED_EVENTS: usize = LOG_BUFFER_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSnapshot {
    pub paused: bool,
    /// Descriptive connection state. `None` until the first `connection-state`
    /// push after a bootstrap.
    pub state: Option<String>,
    pub status: String,
    pub config: ConfigSnapshot,
    pub peers: PeerRoster,
    /// Most recent clipboard transfer. Survives re-bootstraps.
    pub last_clipboard: Option<ClipboardActivity>,
}

impl MirrorSnapshot {
    pub fn connection_mode(&self) -> ConnectionMode {
        self.config.connection_mode
    }

    pub fn peer_panel_visible(&self) -> bool {
        panel_visible(self.config.is_lan(), self.paused)
    }
}

/// What changed after folding one input into the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    Unchanged,
    Bootstrapped,
    Status,
    Connection,
    Config { mode_changed: bool },
    Peers,
    Log,
    Clipboard,
    /// The mirror can no longer trust its copy; re-issue `get_initial_state`.
    NeedsReload,
}

/// Holds nothing until bootstrap; events that arrive before the bootstrap
/// reply are queued and replayed on top of it in arrival order.
#[derive(Debug)]
pub struct StateMirror {
    snapshot: Option<MirrorSnapshot>,
    queued: Option<Vec<RawEvent>>,
    logs: Option<LogBuffer>,
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMirror {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: None,
            queued: Some(Vec::new()),
            logs: None,
        }
    }

    /// A mirror for a window that shows a log pane.
    #[must_use]
    pub fn with_log_pane() -> Self {
        Self {
            logs: Some(LogBuffer::new()),
            ..Self::new()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn snapshot(&self) -> Option<&MirrorSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn logs(&self) -> Option<&LogBuffer> {
        self.logs.as_ref()
    }

    pub fn clear_logs(&mut self) {
        if let Some(logs) = &mut self.logs {
            logs.clear();
        }
    }

    /// Starts queueing pushes until the next [`bootstrap`](Self::bootstrap).
    pub fn begin_reload(&mut self) {
        if self.queued.is_none() {
            self.queued = Some(Vec::new());
        }
    }

    /// Replaces the whole mirror from a `get_initial_state` reply, then
    /// replays whatever was pushed while the reply was in flight.
    ///
    /// The log tail is only taken on the first bootstrap; on a reload the
    /// pane keeps its own buffer and the queued entries are appended to it.
    pub fn bootstrap(&mut self, initial: InitialState) -> Vec<MirrorUpdate> {
        let previous = self.snapshot.take();
        let first = previous.is_none();
        let peers = match previous.as_ref() {
            Some(prev) if initial.config.is_lan() => prev.peers.clone(),
            _ => PeerRoster::new(),
        };
        let last_clipboard = previous.as_ref().and_then(|prev| prev.last_clipboard.clone());
        let status = previous.map(|prev| prev.status).unwrap_or_default();

        self.snapshot = Some(MirrorSnapshot {
            paused: initial.paused,
            state: None,
            status,
            config: initial.config,
            peers,
            last_clipboard,
        });

        if let (true, Some(logs), Some(lines)) = (first, &mut self.logs, initial.logs) {
            logs.replace(lines.into_iter().map(LogEntry::from_line));
        }

        let mut updates = vec![MirrorUpdate::Bootstrapped];
        let queued = self.queued.take().unwrap_or_default();
        debug!(replayed = queued.len(), "mirror bootstrapped");
        for event in &queued {
            let update = self.apply(event);
            if update != MirrorUpdate::Unchanged {
                updates.push(update);
            }
        }
        updates
    }

    /// Gives up on a reload whose bootstrap failed. Queued pushes are folded
    /// into the copy already held so the window keeps following the host; with
    /// no copy yet, only log lines are kept and queueing continues.
    pub fn abandon_reload(&mut self) -> Vec<MirrorUpdate> {
        let Some(queued) = self.queued.take() else {
            return Vec::new();
        };
        let loading = self.snapshot.is_none();
        if loading {
            self.queued = Some(Vec::new());
        }
        debug!(dropped = queued.len(), loading, "reload abandoned");
        queued
            .iter()
            .filter(|event| !loading || event.topic == Topic::LogEntry)
            .map(|event| self.fold(event))
            .filter(|update| *update != MirrorUpdate::Unchanged)
            .collect()
    }

    pub fn deliver(&mut self, delivery: &Delivery) -> MirrorUpdate {
        match delivery {
            Delivery::Event(event) => self.apply(event),
            Delivery::Missed(skipped) => {
                warn!(skipped, "window missed pushed events");
                MirrorUpdate::NeedsReload
            }
        }
    }

    /// Folds one push into the mirror. Every slice is replaced whole.
    pub fn apply(&mut self, event: &RawEvent) -> MirrorUpdate {
        if event.topic.is_tray_signal() {
            debug!(topic = %event.topic, "tray signal, reloading");
            return MirrorUpdate::NeedsReload;
        }

        if let Some(queue) = &mut self.queued {
            if queue.len() < MAX_QUEUED_EVENTS {
                queue.push(event.clone());
                return MirrorUpdate::Unchanged;
            }
            warn!(queued = queue.len(), "too many pushes during reload, starting over");
            let overflow = std::mem::take(queue);
            for log_event in overflow.iter().chain([event]) {
                if log_event.topic == Topic::LogEntry {
                    self.fold(log_event);
                }
            }
            return MirrorUpdate::NeedsReload;
        }

        self.fold(event)
    }

    fn fold(&mut self, event: &RawEvent) -> MirrorUpdate {
        let decoded = PushEvent::decode(event);

        // The log pane does not depend on the snapshot.
        if event.topic == Topic::LogEntry {
            return match (decoded, &mut self.logs) {
                (Ok(PushEvent::LogEntry(entry)), Some(logs)) => {
                    logs.push(entry);
                    MirrorUpdate::Log
                }
                (Ok(_), _) => MirrorUpdate::Unchanged,
                (Err(err), _) => {
                    warn!("dropping log entry: {}", err);
                    MirrorUpdate::Unchanged
                }
            };
        }

        if event.topic == Topic::ClipboardEvent {
            let Some(snapshot) = self.snapshot.as_mut() else {
                return MirrorUpdate::Unchanged;
            };
            return match decoded {
                Ok(PushEvent::ClipboardEvent(activity)) => {
                    snapshot.last_clipboard = Some(activity);
                    MirrorUpdate::Clipboard
                }
                Ok(_) => MirrorUpdate::Unchanged,
                Err(err) => {
                    warn!("dropping clipboard event: {}", err);
                    MirrorUpdate::Unchanged
                }
            };
        }

        let Some(snapshot) = self.snapshot.as_mut() else {
            return MirrorUpdate::Unchanged;
        };

        match decoded {
            Ok(PushEvent::StatusUpdate(text)) => {
                snapshot.status = text;
                MirrorUpdate::Status
            }
            Ok(PushEvent::ConnectionState(state)) => {
                snapshot.paused = state.paused;
                snapshot.state = Some(state.state);
                MirrorUpdate::Connection
            }
            Ok(PushEvent::ConfigChanged(config)) => {
                let mode_changed = snapshot.config.connection_mode != config.connection_mode;
                if !config.is_lan() {
                    snapshot.peers.clear();
                }
                snapshot.config = config;
                MirrorUpdate::Config { mode_changed }
            }
            Ok(PushEvent::LanPeersChanged(peers)) => {
                snapshot.peers.replace(peers);
                MirrorUpdate::Peers
            }
            Ok(PushEvent::LogEntry(_) | PushEvent::ClipboardEvent(_) | PushEvent::Tray(_)) => {
                MirrorUpdate::Unchanged
            }
            Err(err) => {
                warn!(topic = %event.topic, "malformed push payload: {}", err);
                match event.topic {
                    Topic::LanPeersChanged => {
                        snapshot.peers.clear();
                        MirrorUpdate::Peers
                    }
                    Topic::StatusUpdate => {
                        snapshot.status.clear();
                        MirrorUpdate::Status
                    }
                    _ => MirrorUpdate::NeedsReload,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clipsync_core::{ConnectionPhase, PeerEntry, TraySignal};
    use serde_json::json;

    use super::*;

    fn push(event: PushEvent) -> RawEvent {
        event.encode().unwrap()
    }

    fn initial(paused: bool, config: ConfigSnapshot) -> InitialState {
        InitialState {
            paused,
            config,
            logs: Some(vec!["[INFO] started".to_owned()]),
        }
    }

    fn lan() -> ConfigSnapshot {
        ConfigSnapshot {
            connection_mode: ConnectionMode::Lan,
            ..ConfigSnapshot::default()
        }
    }

    fn peers(ids: &[&str]) -> Vec<PeerEntry> {
        ids.iter()
            .map(|id| PeerEntry {
                device_id: (*id).to_owned(),
                device_name: (*id).to_owned(),
                addr: "10.0.0.9".to_owned(),
                tcp_port: 0,
                last_seen: 0,
            })
            .collect()
    }

    fn ready(config: ConfigSnapshot) -> StateMirror {
        let mut mirror = StateMirror::with_log_pane();
        mirror.bootstrap(initial(false, config));
        mirror
    }

    #[test]
    fn loading_until_bootstrap() {
        let mut mirror = StateMirror::new();
        assert!(mirror.is_loading());
        assert_eq!(
            mirror.apply(&push(PushEvent::StatusUpdate("early".into()))),
            MirrorUpdate::Unchanged
        );
        assert!(mirror.snapshot().is_none());

        mirror.bootstrap(initial(true, ConfigSnapshot::default()));
        let snapshot = mirror.snapshot().unwrap();
        assert!(snapshot.paused);
        assert_eq!(snapshot.connection_mode(), ConnectionMode::Server);
        assert_eq!(snapshot.status, "early");
    }

    #[test]
    fn events_pushed_during_bootstrap_are_replayed_in_order() {
        let mut mirror = StateMirror::new();
        let newer = ConfigSnapshot {
            server_url: "wss://newer".into(),
            ..ConfigSnapshot::default()
        };
        mirror.apply(&push(PushEvent::ConfigChanged(newer.clone())));
        mirror.apply(&push(PushEvent::ConnectionState(
            ConnectionPhase::Connected.to_state(),
        )));

        let updates = mirror.bootstrap(initial(true, ConfigSnapshot::default()));
        assert_eq!(updates[0], MirrorUpdate::Bootstrapped);
        let snapshot = mirror.snapshot().unwrap();
        assert_eq!(snapshot.config, newer);
        assert!(!snapshot.paused);
        assert_eq!(snapshot.state.as_deref(), Some("Connected"));
    }

    #[test]
    fn config_changes_replace_the_whole_snapshot() {
        let mut mirror = ready(ConfigSnapshot::default());
        let first = ConfigSnapshot {
            token: "first".into(),
            username: "alice".into(),
            ..ConfigSnapshot::default()
        };
        let second = ConfigSnapshot {
            server_url: "wss://second".into(),
            ..ConfigSnapshot::default()
        };
        mirror.apply(&push(PushEvent::ConfigChanged(first)));
        mirror.apply(&push(PushEvent::ConfigChanged(second.clone())));
        assert_eq!(mirror.snapshot().unwrap().config, second);
    }

    #[test]
    fn leaving_lan_clears_roster_without_peer_event() {
        let mut mirror = ready(lan());
        mirror.apply(&push(PushEvent::LanPeersChanged(peers(&["a", "b", "c"]))));
        assert_eq!(mirror.snapshot().unwrap().peers.len(), 3);

        let update = mirror.apply(&push(PushEvent::ConfigChanged(ConfigSnapshot::default())));
        assert_eq!(update, MirrorUpdate::Config { mode_changed: true });
        assert!(mirror.snapshot().unwrap().peers.is_empty());
    }

    #[test]
    fn paused_server_then_lan_push() {
        let mut mirror = StateMirror::new();
        mirror.bootstrap(initial(true, ConfigSnapshot::default()));
        let snapshot = mirror.snapshot().unwrap();
        assert!(snapshot.paused);
        assert_eq!(snapshot.connection_mode(), ConnectionMode::Server);

        mirror.apply(&push(PushEvent::ConfigChanged(lan())));
        let snapshot = mirror.snapshot().unwrap();
        assert_eq!(snapshot.connection_mode(), ConnectionMode::Lan);
        assert!(snapshot.peers.is_empty());
        assert!(!snapshot.peer_panel_visible());
    }

    #[test]
    fn malformed_roster_collapses_to_empty() {
        let mut mirror = ready(lan());
        mirror.apply(&push(PushEvent::LanPeersChanged(peers(&["a"]))));

        let update = mirror.apply(&RawEvent {
            topic: Topic::LanPeersChanged,
            payload: json!("[{not json"),
        });
        assert_eq!(update, MirrorUpdate::Peers);
        assert!(mirror.snapshot().unwrap().peers.is_empty());
    }

    #[test]
    fn malformed_config_asks_for_reload() {
        let mut mirror = ready(ConfigSnapshot::default());
        let update = mirror.apply(&RawEvent {
            topic: Topic::ConfigChanged,
            payload: json!(42),
        });
        assert_eq!(update, MirrorUpdate::NeedsReload);
        assert_eq!(mirror.snapshot().unwrap().config, ConfigSnapshot::default());
    }

    #[test]
    fn tray_signals_and_missed_events_ask_for_reload() {
        let mut mirror = ready(ConfigSnapshot::default());
        let sync = push(PushEvent::Tray(TraySignal::Sync));
        assert_eq!(mirror.apply(&sync), MirrorUpdate::NeedsReload);
        assert_eq!(mirror.deliver(&Delivery::Missed(4)), MirrorUpdate::NeedsReload);
    }

    #[test]
    fn reload_keeps_lan_roster_and_log_pane() {
        let mut mirror = ready(lan());
        mirror.apply(&push(PushEvent::LanPeersChanged(peers(&["a"]))));
        mirror.apply(&push(PushEvent::LogEntry(LogEntry::new("INFO", "hello"))));

        mirror.begin_reload();
        mirror.apply(&push(PushEvent::LogEntry(LogEntry::new("WARN", "queued"))));
        mirror.bootstrap(InitialState {
            paused: false,
            config: lan(),
            logs: Some(vec!["[INFO] only tail".to_owned()]),
        });

        assert_eq!(mirror.snapshot().unwrap().peers.len(), 1);
        let lines = mirror.logs().unwrap().lines();
        assert_eq!(lines, ["[INFO] started", "[INFO] hello", "[WARN] queued"]);
    }

    #[test]
    fn log_pane_is_bounded() {
        let mut mirror = ready(ConfigSnapshot::default());
        for i in 0..2_100 {
            mirror.apply(&push(PushEvent::LogEntry(LogEntry::new("INFO", &format!("{i}")))));
        }
        let logs = mirror.logs().unwrap();
        assert_eq!(logs.len(), 2_000);
        assert_eq!(logs.iter().next().unwrap().line, "[INFO] 100");
    }

    #[test]
    fn failed_reload_folds_queued_pushes_into_the_held_copy() {
        let mut mirror = ready(ConfigSnapshot::default());
        mirror.begin_reload();
        mirror.apply(&push(PushEvent::ConfigChanged(lan())));
        mirror.apply(&push(PushEvent::ConnectionState(
            ConnectionPhase::Paused.to_state(),
        )));

        let updates = mirror.abandon_reload();
        assert!(updates.contains(&MirrorUpdate::Config { mode_changed: true }));
        let snapshot = mirror.snapshot().unwrap();
        assert_eq!(snapshot.connection_mode(), ConnectionMode::Lan);
        assert!(snapshot.paused);

        // Live again: later pushes land directly.
        let status = push(PushEvent::StatusUpdate("after".into()));
        assert_eq!(mirror.apply(&status), MirrorUpdate::Status);
    }

    #[test]
    fn failed_first_load_keeps_only_log_lines() {
        let mut mirror = StateMirror::with_log_pane();
        mirror.apply(&push(PushEvent::StatusUpdate("early".into())));
        mirror.apply(&push(PushEvent::LogEntry(LogEntry::new("INFO", "early line"))));

        assert_eq!(mirror.abandon_reload(), vec![MirrorUpdate::Log]);
        assert!(mirror.is_loading());
        assert_eq!(mirror.logs().unwrap().lines(), ["[INFO] early line"]);

        mirror.apply(&push(PushEvent::StatusUpdate("queued".into())));
        mirror.bootstrap(initial(false, ConfigSnapshot::default()));
        assert_eq!(mirror.snapshot().unwrap().status, "queued");
    }

    #[test]
    fn reload_queue_is_bounded() {
        let mut mirror = ready(ConfigSnapshot::default());
        mirror.begin_reload();
        let status = push(PushEvent::StatusUpdate("tick".into()));
        for _ in 0..MAX_QUEUED_EVENTS {
            assert_eq!(mirror.apply(&status), MirrorUpdate::Unchanged);
        }
        assert_eq!(mirror.apply(&status), MirrorUpdate::NeedsReload);

        // Still waiting for a bootstrap, with an empty queue.
        assert_eq!(mirror.apply(&status), MirrorUpdate::Unchanged);
        let updates = mirror.bootstrap(initial(false, ConfigSnapshot::default()));
        assert_eq!(updates, [MirrorUpdate::Bootstrapped, MirrorUpdate::Status]);
    }

    #[test]
    fn clipboard_activity_survives_reload_and_ignores_garbage() {
        let mut mirror = ready(ConfigSnapshot::default());
        let activity = ClipboardActivity {
            direction: clipsync_core::ClipboardDirection::Received,
            content_type: "image".to_owned(),
        };
        let event = push(PushEvent::ClipboardEvent(activity.clone()));
        assert_eq!(mirror.apply(&event), MirrorUpdate::Clipboard);

        let garbage = RawEvent {
            topic: Topic::ClipboardEvent,
            payload: json!({"type": "sideways"}),
        };
        assert_eq!(mirror.apply(&garbage), MirrorUpdate::Unchanged);

        mirror.begin_reload();
        mirror.bootstrap(initial(false, ConfigSnapshot::default()));
        assert_eq!(mirror.snapshot().unwrap().last_clipboard, Some(activity));
    }
}
