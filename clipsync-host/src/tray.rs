//! Tray menu and status indicator. The tray reads the same push topics as
//! the windows and forwards its menu signals to the host.

use clipsync_core::{
    ConnectionPhase, ConnectionState, Delivery, PushEvent, SubscriptionSet, Topic, TraySignal,
    WindowLabel,
};
use tracing::{debug, info, warn};

use crate::host::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayMenuItem {
    Show,
    Settings,
    Sync,
    Pause,
    Resume,
    Quit,
}

impl TrayMenuItem {
    pub const ALL: [TrayMenuItem; 6] = [
        TrayMenuItem::Show,
        TrayMenuItem::Settings,
        TrayMenuItem::Sync,
        TrayMenuItem::Pause,
        TrayMenuItem::Resume,
        TrayMenuItem::Quit,
    ];

    pub fn id(self) -> &'static str {
        match self {
            TrayMenuItem::Show => "show",
            TrayMenuItem::Settings => "settings",
            TrayMenuItem::Sync => "sync",
            TrayMenuItem::Pause => "pause",
            TrayMenuItem::Resume => "resume",
            TrayMenuItem::Quit => "quit",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayOutcome {
    Handled,
    /// The front end should open or focus this window.
    OpenWindow(WindowLabel),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayIcon {
    Red,
    Amber,
    Green,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrayView {
    pub connection: Option<ConnectionState>,
    pub peers: usize,
    pub status: String,
}

pub struct TrayController {
    host: Host,
    view: TrayView,
    subscriptions: SubscriptionSet,
}

impl TrayController {
    /// Subscribes first, then reads the current state, so nothing published
    /// in between is lost.
    pub async fn attach(host: Host) -> Self {
        let mut subscriptions = SubscriptionSet::new();
        for topic in Topic::STATE {
            subscriptions.push(host.bus().subscribe(topic));
        }
        let mut controller = Self {
            host,
            view: TrayView::default(),
            subscriptions,
        };
        controller.bootstrap().await;
        controller
    }

    async fn bootstrap(&mut self) {
        let phase = self.host.phase().await;
        let config = self.host.config().await;
        self.view.connection = Some(phase.to_state());
        self.view.peers = if config.is_lan() {
            self.host.peers().await.len()
        } else {
            0
        };
        debug!(state = %phase, peers = self.view.peers, "tray bootstrapped");
    }

    pub fn view(&self) -> &TrayView {
        &self.view
    }

    pub fn apply(&mut self, event: &PushEvent) {
        match event {
            PushEvent::ConnectionState(state) => self.view.connection = Some(state.clone()),
            PushEvent::LanPeersChanged(peers) => self.view.peers = peers.len(),
            PushEvent::ConfigChanged(config) if !config.is_lan() => self.view.peers = 0,
            PushEvent::StatusUpdate(text) => self.view.status = text.clone(),
            _ => {}
        }
    }

    /// Waits for the next pushed change and folds it into the view. Returns
    /// `false` once the bus has gone away.
    pub async fn pump(&mut self) -> bool {
        let Some(delivery) = self.subscriptions.next().await else {
            return false;
        };
        match delivery {
            Delivery::Event(raw) => match PushEvent::decode(&raw) {
                Ok(event) => self.apply(&event),
                Err(err) => {
                    warn!(topic = %raw.topic, "tray ignored event: {}", err);
                    self.bootstrap().await;
                }
            },
            Delivery::Missed(skipped) => {
                warn!(skipped, "tray fell behind, reloading state");
                self.bootstrap().await;
            }
        }
        true
    }

    pub async fn select(&mut self, item: TrayMenuItem) -> TrayOutcome {
        info!(item = item.id(), "tray menu selected");
        match item {
            TrayMenuItem::Show => TrayOutcome::OpenWindow(WindowLabel::Main),
            TrayMenuItem::Settings => TrayOutcome::OpenWindow(WindowLabel::Settings),
            TrayMenuItem::Sync => {
                self.host.apply_tray_signal(TraySignal::Sync).await;
                TrayOutcome::Handled
            }
            TrayMenuItem::Pause => {
                self.host.apply_tray_signal(TraySignal::Pause).await;
                TrayOutcome::Handled
            }
            TrayMenuItem::Resume => {
                self.host.apply_tray_signal(TraySignal::Resume).await;
                TrayOutcome::Handled
            }
            TrayMenuItem::Quit => {
                self.subscriptions.cancel_all();
                TrayOutcome::Quit
            }
        }
    }

    fn state_text(&self) -> &str {
        self.view
            .connection
            .as_ref()
            .map(|state| state.state.as_str())
            .unwrap_or("Loading")
    }

    pub fn tooltip(&self) -> String {
        format!("ClipSync | {} | peers={}", self.state_text(), self.view.peers)
    }

    /// The pause/resume entry to enable: whichever would change the state.
    pub fn toggle_item(&self) -> TrayMenuItem {
        match &self.view.connection {
            Some(state) if state.paused => TrayMenuItem::Resume,
            _ => TrayMenuItem::Pause,
        }
    }

    pub fn icon(&self) -> TrayIcon {
        let text = self.state_text();
        if text == ConnectionPhase::Disconnected.to_string() {
            TrayIcon::Red
        } else if text == ConnectionPhase::Connected.to_string() {
            TrayIcon::Green
        } else {
            TrayIcon::Amber
        }
    }
}
