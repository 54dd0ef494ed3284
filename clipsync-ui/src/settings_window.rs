//! Controller of the settings window.

use std::fmt;

use clipsync_core::{
    BackendClient, CallError, CloseBehavior, ConfigSnapshot, Delivery, InitialState,
    SubscriptionSet, Topic, WindowLabel,
};
use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    app::{FrontEnd, WindowExit},
    mirror::{MirrorUpdate, StateMirror},
    settings::{FieldEdit, Selection, SettingsAction, SettingsEngine, SettingsPhase},
    windows::{CloseAction, WindowHost},
};

const TOPICS: [Topic; 4] = [Topic::ConfigChanged, Topic::Sync, Topic::Pause, Topic::Resume];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsIntent {
    Edit(FieldEdit),
    /// Focus left a text field.
    Blur,
    Select(Selection),
    Reload,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsView {
    pub phase: SettingsPhase,
    pub form: Option<ConfigSnapshot>,
    /// Inline error from the last rejected save.
    pub form_error: Option<String>,
    /// Transport or window failure, shown in the status line.
    pub notice: Option<String>,
    pub locale: String,
    pub device_name_placeholder: Option<String>,
}

impl SettingsView {
    pub fn loading() -> Self {
        Self {
            phase: SettingsPhase::Uninitialized,
            form: None,
            form_error: None,
            notice: None,
            locale: String::new(),
            device_name_placeholder: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SettingsPhase::Uninitialized
    }
}

enum CallDone {
    Bootstrap(Result<InitialState, CallError>),
    Hostname(Result<String, CallError>),
    Saved(u64, Result<(), CallError>),
    Effects(Result<(), CallError>),
    Logged(Result<(), CallError>),
}

struct SettingsWindow<H> {
    front: FrontEnd<H>,
    client: BackendClient,
    engine: SettingsEngine,
    mirror: StateMirror,
    subscriptions: Option<SubscriptionSet>,
    calls: FuturesUnordered<BoxFuture<'static, CallDone>>,
    bootstrap_in_flight: bool,
    reload_requested: bool,
    needs_bootstrap: bool,
    notice: Option<String>,
}

pub(crate) async fn run_settings_window<H: WindowHost + 'static>(
    front: FrontEnd<H>,
    mut intents: mpsc::UnboundedReceiver<SettingsIntent>,
    view: watch::Sender<SettingsView>,
) -> WindowExit {
    let client = front.client().clone();
    let mut window = SettingsWindow {
        front,
        client,
        engine: SettingsEngine::new(),
        mirror: StateMirror::new(),
        subscriptions: None,
        calls: FuturesUnordered::new(),
        bootstrap_in_flight: false,
        reload_requested: false,
        needs_bootstrap: false,
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

impl<H: WindowHost + 'static> SettingsWindow<H> {
    async fn attach(&mut self) {
        match self.client.subscribe_all(&TOPICS).await {
            Ok(set) => {
                self.subscriptions = Some(set);
                self.notice = None;
                self.reload();
            }
            Err(err) => {
                warn!("settings window could not subscribe: {}", err);
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

    async fn on_intent(&mut self, intent: SettingsIntent) -> Option<WindowExit> {
        debug!(?intent, "settings window intent");
        if self.subscriptions.is_none() && intent != SettingsIntent::Close {
            self.attach().await;
        }
        if self.needs_bootstrap && !matches!(intent, SettingsIntent::Close | SettingsIntent::Reload) {
            self.reload();
        }

        match intent {
            SettingsIntent::Edit(edit) => {
                self.engine.edit(edit);
            }
            SettingsIntent::Blur => {
                if let Some(action) = self.engine.blur() {
                    self.run_actions(vec![action]);
                }
            }
            SettingsIntent::Select(selection) => {
                let actions = self.engine.select(selection);
                self.run_actions(actions);
            }
            SettingsIntent::Reload => self.reload(),
            SettingsIntent::Close => {
                self.flush_on_close();
                match self
                    .front
                    .registry()
                    .request_close(WindowLabel::Settings, CloseBehavior::default())
                {
                    Ok(CloseAction::Quit) => return Some(WindowExit::Quit),
                    Ok(_) => return Some(WindowExit::Closed),
                    Err(err) => self.report(err),
                }
            }
        }
        None
    }

    /// Commits a pending edit whose field never lost focus. The reply has no
    /// window left to land in, so it is only logged.
    fn flush_on_close(&mut self) {
        let Some(SettingsAction::Persist { ticket, form }) = self.engine.blur() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.save_settings(form).await {
                Ok(()) => info!(ticket, "settings saved on close"),
                Err(err) => warn!(ticket, "settings save on close failed: {}", err),
            }
        });
    }

    fn on_delivery(&mut self, delivery: Option<Delivery>) {
        let Some(delivery) = delivery else {
            warn!("host connection lost, settings window detached");
            self.detach();
            self.notice = Some(
                CallError::BackendUnavailable("connection to host lost".to_owned()).to_string(),
            );
            return;
        };
        match self.mirror.deliver(&delivery) {
            MirrorUpdate::NeedsReload => self.reload(),
            MirrorUpdate::Config { .. } => self.push_external(),
            _ => {}
        }
    }

    fn push_external(&mut self) {
        let Some(config) = self.mirror.snapshot().map(|s| s.config.clone()) else {
            return;
        };
        let actions = self.engine.on_external(config);
        self.run_actions(actions);
    }

    fn on_call_done(&mut self, done: CallDone) {
        match done {
            CallDone::Bootstrap(result) => {
                self.bootstrap_in_flight = false;
                match result {
                    Ok(initial) => self.on_bootstrap(initial),
                    Err(err) => {
                        warn!("settings state unavailable: {}", err);
                        self.needs_bootstrap = true;
                        self.reload_requested = false;
                        let updates = self.mirror.abandon_reload();
                        if updates.iter().any(|u| matches!(u, MirrorUpdate::Config { .. })) {
                            self.push_external();
                        }
                        self.report(err);
                    }
                }
            }
            CallDone::Hostname(Ok(hostname)) => self.engine.set_hostname(hostname),
            CallDone::Hostname(Err(err)) => debug!("hostname unavailable: {}", err),
            CallDone::Saved(ticket, result) => {
                if let Err(err @ CallError::BackendUnavailable(_)) = &result {
                    self.report(err);
                }
                self.engine.on_save_result(ticket, result);
            }
            CallDone::Effects(Ok(())) => {}
            CallDone::Effects(Err(err)) => {
                warn!("window effects failed: {}", err);
                self.report(err);
            }
            CallDone::Logged(Ok(())) => {}
            CallDone::Logged(Err(err)) => debug!("notice not forwarded to host: {}", err),
        }
    }

    /// Shows an error in the status line and copies it into the host log.
    fn report(&mut self, err: impl fmt::Display) {
        let message = err.to_string();
        let client = self.client.clone();
        let line = format!("settings window: {message}");
        self.calls.push(
            async move { CallDone::Logged(client.frontend_log("warn", &line).await) }.boxed(),
        );
        self.notice = Some(message);
    }

    fn on_bootstrap(&mut self, initial: InitialState) {
        let first = self.engine.phase() == SettingsPhase::Uninitialized;
        let updates = self.mirror.bootstrap(initial);
        let Some(config) = self.mirror.snapshot().map(|s| s.config.clone()) else {
            return;
        };

        let actions = if first {
            let client = self.client.clone();
            self.calls
                .push(async move { CallDone::Hostname(client.get_hostname().await) }.boxed());
            self.engine.bootstrap(config)
        } else {
            self.engine.on_external(config)
        };
        self.run_actions(actions);

        if self.reload_requested || updates.contains(&MirrorUpdate::NeedsReload) {
            self.reload();
        }
    }

    fn run_actions(&mut self, actions: Vec<SettingsAction>) {
        for action in actions {
            let client = self.client.clone();
            match action {
                SettingsAction::Persist { ticket, form } => self.calls.push(
                    async move { CallDone::Saved(ticket, client.save_settings(form).await) }
                        .boxed(),
                ),
                SettingsAction::ApplyEffects { effect, theme } => self.calls.push(
                    async move {
                        CallDone::Effects(client.apply_window_effects(effect, theme).await)
                    }
                    .boxed(),
                ),
                SettingsAction::SetLocale(locale) => info!(locale = %locale, "display locale changed"),
            }
        }
    }

    fn publish(&self, view: &watch::Sender<SettingsView>) {
        view.send_replace(SettingsView {
            phase: self.engine.phase(),
            form: self.engine.form().cloned(),
            form_error: self.engine.error().map(str::to_owned),
            notice: self.notice.clone(),
            locale: self.engine.locale().to_owned(),
            device_name_placeholder: self.engine.device_name_placeholder().map(str::to_owned),
        });
    }
}
