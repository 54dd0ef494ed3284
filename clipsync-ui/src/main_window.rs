//! Controller of the main window: connection badge, peer panel, log pane.

use std::fmt;

use clipsync_core::{
    BackendClient, CallError, ClipboardActivity, ConnectionMode, Delivery, InitialState,
    MaterialEffect, PeerEntry, SubscriptionSet, ThemeMode, Topic, WindowLabel,
};
use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    app::{FrontEnd, WindowExit},
    locale::resolve_locale,
    mirror::{MirrorUpdate, StateMirror},
    windows::{CloseAction, WindowHost},
};

const TOPICS: [Topic; 9] = [
    Topic::StatusUpdate,
    Topic::ConnectionState,
    Topic::ConfigChanged,
    Topic::LanPeersChanged,
    Topic::LogEntry,
    Topic::ClipboardEvent,
    Topic::Sync,
    Topic::Pause,
    Topic::Resume,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainIntent {
    TogglePause,
    OpenSettings,
    OpenLogFolder,
    ClearLogs,
    /// Re-read everything from the host; also reconnects a detached window.
    Reload,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainView {
    pub loading: bool,
    /// Whether push subscriptions are live.
    pub attached: bool,
    pub paused: bool,
    pub mode: Option<ConnectionMode>,
    pub state: Option<String>,
    pub status: String,
    pub peers: Vec<PeerEntry>,
    pub peer_panel_visible: bool,
    pub logs: Vec<String>,
    pub last_clipboard: Option<ClipboardActivity>,
    /// Display locale resolved from the language preference.
    pub locale: String,
    /// Last user-visible error.
    pub notice: Option<String>,
}

impl MainView {
    pub fn loading() -> Self {
        Self {
            loading: true,
            attached: false,
            paused: false,
            mode: None,
            state: None,
            status: String::new(),
            peers: Vec::new(),
            peer_panel_visible: false,
            logs: Vec::new(),
            last_clipboard: None,
            locale: String::new(),
            notice: None,
        }
    }

    fn render<H>(window: &MainWindow<H>) -> Self {
        let mirror = &window.mirror;
        let attached = window.subscriptions.is_some();
        let notice = &window.notice;
        let logs = mirror.logs().map(|logs| logs.lines()).unwrap_or_default();
        let Some(snapshot) = mirror.snapshot() else {
            return Self {
                attached,
                logs,
                notice: notice.clone(),
                ..Self::loading()
            };
        };
        Self {
            loading: false,
            attached,
            paused: snapshot.paused,
            mode: Some(snapshot.connection_mode()),
            state: snapshot.state.clone(),
            status: snapshot.status.clone(),
            peers: snapshot.peers.as_slice().to_vec(),
            peer_panel_visible: snapshot.peer_panel_visible(),
            logs,
            last_clipboard: snapshot.last_clipboard.clone(),
            locale: window.locale.clone(),
            notice: notice.clone(),
        }
    }

    pub fn mode_badge(&self) -> &'static str {
        match self.mode {
            None => "…",
            Some(ConnectionMode::Server) => "Server",
            Some(ConnectionMode::Lan) => "LAN",
        }
    }

    pub fn pause_badge(&self) -> &'static str {
        match (self.loading, self.paused) {
            (true, _) => "Loading",
            (false, true) => "Paused",
            (false, false) => "Syncing",
        }
    }
}

enum CallDone {
    Bootstrap(Result<InitialState, CallError>),
    TogglePause(Result<(), CallError>),
    OpenLogFolder(Result<(), CallError>),
    ClearLogs(Result<(), CallError>),
    Effects(Result<(), CallError>),
    Logged(Result<(), CallError>),
}

struct MainWindow<H> {
    front: FrontEnd<H>,
    client: BackendClient,
    mirror: StateMirror,
    subscriptions: Option<SubscriptionSet>,
    calls: FuturesUnordered<BoxFuture<'static, CallDone>>,
    bootstrap_in_flight: bool,
    /// A reload was requested after the in-flight bootstrap was issued.
    reload_requested: bool,
    /// The last bootstrap failed; the next intent retries it.
    needs_bootstrap: bool,
    locale: String,
    applied_effects: Option<(MaterialEffect, ThemeMode)>,
    notice: Option<String>,
}

pub(crate) async fn run_main_window<H: WindowHost + 'static>(
    front: FrontEnd<H>,
    mut intents: mpsc::UnboundedReceiver<MainIntent>,
    view: watch::Sender<MainView>,
) -> WindowExit {
    let client = front.client().clone();
    let mut window = MainWindow {
        front,
        client,
        mirror: StateMirror::with_log_pane(),
        subscriptions: None,
        calls: FuturesUnordered::new(),
        bootstrap_in_flight: false,
        reload_requested: false,
        needs_bootstrap: false,
        locale: String::new(),
        applied_effects: None,
        notice: None,
    };
    window.attach().await;
    window.publish(&view);

    let exit = loop {
        tokio::select! {
            intent = intents.recv() => {
                let Some(intent) = intent else { break WindowExit::Closed };
                if let Some(exit) = window.on_intent(intent).await {
                    break exit;
                }
            }
            delivery = next_delivery(&mut window.subscriptions) => window.on_delivery(delivery),
            Some(done) = window.calls.next(), if !window.calls.is_empty() => window.on_call_done(done),
        }
        window.publish(&view);
    };

    window.detach();
    window.publish(&view);
    exit
}

async fn next_delivery(subscriptions: &mut Option<SubscriptionSet>) -> Option<Delivery> {
    match subscriptions {
        Some(set) => set.next().await,
        None => std::future::pending().await,
    }
}

impl<H: WindowHost + 'static> MainWindow<H> {
    /// Subscribes to every topic, then asks for the initial state.
    async fn attach(&mut self) {
        match self.client.subscribe_all(&TOPICS).await {
            Ok(set) => {
                self.subscriptions = Some(set);
                self.notice = None;
                self.reload();
            }
            Err(err) => {
                warn!("main window could not subscribe: {}", err);
                self.report(err);
            }
        }
    }

    fn detach(&mut self) {
        if let Some(mut set) = self.subscriptions.take() {
            set.cancel_all();
        }
    }

    fn reload(&mut self) {
        self.mirror.begin_reload();
        if self.bootstrap_in_flight {
            self.reload_requested = true;
            return;
        }
        self.bootstrap_in_flight = true;
        self.reload_requested = false;
        self.needs_bootstrap = false;
        let client = self.client.clone();
        self.calls.push(
            async move { CallDone::Bootstrap(client.get_initial_state().await) }.boxed(),
        );
    }

    async fn on_intent(&mut self, intent: MainIntent) -> Option<WindowExit> {
        debug!(?intent, "main window intent");
        if self.subscriptions.is_none() && intent != MainIntent::Close {
            self.attach().await;
            if self.subscriptions.is_none() {
                return None;
            }
        }
        if self.needs_bootstrap && !matches!(intent, MainIntent::Close | MainIntent::Reload) {
            self.reload();
        }

        let client = self.client.clone();
        match intent {
            MainIntent::TogglePause => self
                .calls
                .push(async move { CallDone::TogglePause(client.toggle_pause().await) }.boxed()),
            MainIntent::OpenLogFolder => self.calls.push(
                async move { CallDone::OpenLogFolder(client.open_log_folder().await) }.boxed(),
            ),
            MainIntent::ClearLogs => self
                .calls
                .push(async move { CallDone::ClearLogs(client.clear_logs().await) }.boxed()),
            MainIntent::OpenSettings => {
                if let Err(err) = self.front.open_or_focus(WindowLabel::Settings) {
                    warn!("settings window unavailable: {}", err);
                    self.report(err);
                }
            }
            MainIntent::Reload => self.reload(),
            MainIntent::Close => {
                let behavior = self
                    .mirror
                    .snapshot()
                    .map(|snapshot| snapshot.config.close_behavior)
                    .unwrap_or_default();
                match self.front.registry().request_close(WindowLabel::Main, behavior) {
                    Ok(CloseAction::Quit) => return Some(WindowExit::Quit),
                    Ok(CloseAction::Close) => return Some(WindowExit::Closed),
                    Ok(CloseAction::Hide | CloseAction::Minimize) => {}
                    Err(err) => self.report(err),
                }
            }
        }
        None
    }

    fn on_delivery(&mut self, delivery: Option<Delivery>) {
        let Some(delivery) = delivery else {
            warn!("host connection lost, main window detached");
            self.detach();
            self.notice = Some(CallError::BackendUnavailable("connection to host lost".to_owned()).to_string());
            return;
        };
        match self.mirror.deliver(&delivery) {
            MirrorUpdate::NeedsReload => self.reload(),
            MirrorUpdate::Config { .. } => self.follow_config(),
            _ => {}
        }
    }

    fn on_call_done(&mut self, done: CallDone) {
        match done {
            CallDone::Bootstrap(result) => {
                self.bootstrap_in_flight = false;
                match result {
                    Ok(initial) => {
                        let updates = self.mirror.bootstrap(initial);
                        info!(updates = updates.len(), "main window state loaded");
                        self.follow_config();
                        if self.reload_requested || updates.contains(&MirrorUpdate::NeedsReload) {
                            self.reload();
                        }
                    }
                    Err(err) => {
                        warn!("initial state unavailable: {}", err);
                        self.needs_bootstrap = true;
                        self.reload_requested = false;
                        let updates = self.mirror.abandon_reload();
                        if updates.iter().any(|u| matches!(u, MirrorUpdate::Config { .. })) {
                            self.follow_config();
                        }
                        self.report(err);
                    }
                }
            }
            CallDone::ClearLogs(Ok(())) => self.mirror.clear_logs(),
            CallDone::TogglePause(Ok(())) | CallDone::OpenLogFolder(Ok(())) => {}
            CallDone::Effects(Ok(())) | CallDone::Logged(Ok(())) => {}
            CallDone::TogglePause(Err(err))
            | CallDone::OpenLogFolder(Err(err))
            | CallDone::ClearLogs(Err(err))
            | CallDone::Effects(Err(err)) => {
                warn!("main window command failed: {}", err);
                self.report(err);
            }
            CallDone::Logged(Err(err)) => debug!("notice not forwarded to host: {}", err),
        }
    }

    /// Tracks the display locale and re-applies window effects when the
    /// material or theme differs from what this window last applied.
    fn follow_config(&mut self) {
        let Some(config) = self.mirror.snapshot().map(|s| &s.config) else {
            return;
        };
        let locale = resolve_locale(&config.language);
        let effects = (config.material_effect, config.theme_mode);
        if locale != self.locale {
            info!(locale = %locale, "display locale changed");
            self.locale = locale;
        }
        if self.applied_effects == Some(effects) {
            return;
        }
        self.applied_effects = Some(effects);
        let client = self.client.clone();
        self.calls.push(
            async move {
                let (effect, theme) = effects;
                CallDone::Effects(client.apply_window_effects(effect, theme).await)
            }
            .boxed(),
        );
    }

    /// Shows an error in the status line and copies it into the host log.
    fn report(&mut self, err: impl fmt::Display) {
        let message = err.to_string();
        let client = self.client.clone();
        let line = format!("main window: {message}");
        self.calls.push(
            async move { CallDone::Logged(client.frontend_log("warn", &line).await) }.boxed(),
        );
        self.notice = Some(message);
    }

    fn publish(&self, view: &watch::Sender<MainView>) {
        view.send_replace(MainView::render(self));
    }
}
