//! Edit/save lifecycle of the settings form.
//!
//! The engine is pure: it takes user gestures, save results and pushed
//! configurations, and answers with the [`SettingsAction`]s the window has to
//! carry out against the host.

use clipsync_core::{
    CallError, CloseBehavior, ConfigSnapshot, ConnectionMode, Language, MaterialEffect, ThemeMode,
};
use tracing::{debug, info, warn};

use crate::locale::resolve_locale_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsPhase {
    Uninitialized,
    Synced,
    Dirty,
    Saving,
}

/// A keystroke-level change to a text-like field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    ServerUrl(String),
    Token(String),
    Username(String),
    Password(String),
    LanDeviceName(String),
    MaxImageKb(u64),
}

/// A button-style choice. These commit as soon as they are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Language(Language),
    ConnectionMode(ConnectionMode),
    CloseBehavior(CloseBehavior),
    MaterialEffect(MaterialEffect),
    ThemeMode(ThemeMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsAction {
    /// Send `form` with `save_settings`; report the result with `ticket`.
    Persist { ticket: u64, form: ConfigSnapshot },
    ApplyEffects {
        effect: MaterialEffect,
        theme: ThemeMode,
    },
    SetLocale(String),
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send>;

pub struct SettingsEngine {
    phase: SettingsPhase,
    form: ConfigSnapshot,
    baseline: ConfigSnapshot,
    next_ticket: u64,
    in_flight: Option<(u64, ConfigSnapshot)>,
    error: Option<String>,
    locale: String,
    hostname: Option<String>,
    env: EnvLookup,
}

impl std::fmt::Debug for SettingsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsEngine")
            .field("phase", &self.phase)
            .field("form", &self.form)
            .field("in_flight", &self.in_flight.as_ref().map(|(ticket, _)| ticket))
            .field("error", &self.error)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

impl Default for SettingsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsEngine {
    pub fn new() -> Self {
        Self::with_env(|var| std::env::var(var).ok())
    }

    /// An engine that resolves the system locale through `lookup` instead of
    /// the process environment.
    pub fn with_env(lookup: impl Fn(&str) -> Option<String> + Send + 'static) -> Self {
        Self {
            phase: SettingsPhase::Uninitialized,
            form: ConfigSnapshot::default(),
            baseline: ConfigSnapshot::default(),
            next_ticket: 1,
            in_flight: None,
            error: None,
            locale: String::new(),
            hostname: None,
            env: Box::new(lookup),
        }
    }

    pub fn phase(&self) -> SettingsPhase {
        self.phase
    }

    /// The form as currently edited. Meaningless before bootstrap.
    pub fn form(&self) -> Option<&ConfigSnapshot> {
        (self.phase != SettingsPhase::Uninitialized).then_some(&self.form)
    }

    pub fn baseline(&self) -> Option<&ConfigSnapshot> {
        (self.phase != SettingsPhase::Uninitialized).then_some(&self.baseline)
    }

    /// The last save rejection, shown next to the form until the next commit.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_hostname(&mut self, hostname: String) {
        self.hostname = Some(hostname);
    }

    /// Hint shown in an empty LAN device name field.
    pub fn device_name_placeholder(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// The name this device will announce on the LAN.
    pub fn effective_device_name(&self) -> Option<&str> {
        let form = self.form()?;
        if form.lan_device_name.trim().is_empty() {
            self.device_name_placeholder()
        } else {
            Some(form.lan_device_name.as_str())
        }
    }

    pub fn bootstrap(&mut self, config: ConfigSnapshot) -> Vec<SettingsAction> {
        let mut actions = Vec::new();
        let locale = self.resolve(&config.language);
        if locale != self.locale {
            self.locale = locale.clone();
            actions.push(SettingsAction::SetLocale(locale));
        }
        self.form = config.clone();
        self.baseline = config;
        self.phase = SettingsPhase::Synced;
        self.error = None;
        debug!("settings bootstrapped");
        actions
    }

    /// Applies a keystroke-level edit locally. Ignored before bootstrap.
    pub fn edit(&mut self, edit: FieldEdit) -> bool {
        if self.phase == SettingsPhase::Uninitialized {
            return false;
        }
        match edit {
            FieldEdit::ServerUrl(value) => self.form.server_url = value,
            FieldEdit::Token(value) => self.form.token = value,
            FieldEdit::Username(value) => self.form.username = value,
            FieldEdit::Password(value) => self.form.password = value,
            FieldEdit::LanDeviceName(value) => self.form.lan_device_name = value,
            FieldEdit::MaxImageKb(value) => self.form.max_image_kb = value,
        }
        self.phase = SettingsPhase::Dirty;
        true
    }

    /// Field exit: commits the whole form if anything is pending.
    pub fn blur(&mut self) -> Option<SettingsAction> {
        if self.phase != SettingsPhase::Dirty {
            return None;
        }
        Some(self.commit())
    }

    /// A button-style choice: applied, side effects requested, and committed
    /// immediately.
    pub fn select(&mut self, selection: Selection) -> Vec<SettingsAction> {
        if self.phase == SettingsPhase::Uninitialized {
            return Vec::new();
        }

        let mut actions = Vec::new();
        match selection {
            Selection::Language(language) => {
                let locale = self.resolve(&language);
                self.form.language = language;
                self.locale = locale.clone();
                actions.push(SettingsAction::SetLocale(locale));
            }
            Selection::ConnectionMode(mode) => self.form.connection_mode = mode,
            Selection::CloseBehavior(behavior) => self.form.close_behavior = behavior,
            Selection::MaterialEffect(effect) => {
                self.form.material_effect = effect;
                actions.push(self.effects_action());
            }
            Selection::ThemeMode(theme) => {
                self.form.theme_mode = theme;
                actions.push(self.effects_action());
            }
        }
        self.phase = SettingsPhase::Dirty;
        actions.push(self.commit());
        actions
    }

    fn commit(&mut self) -> SettingsAction {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let form = self.form.clone();
        self.in_flight = Some((ticket, form.clone()));
        self.phase = SettingsPhase::Saving;
        self.error = None;
        debug!(ticket, "committing settings form");
        SettingsAction::Persist { ticket, form }
    }

    /// Folds in the reply to a [`SettingsAction::Persist`]. Replies to
    /// superseded commits are ignored.
    pub fn on_save_result(&mut self, ticket: u64, result: Result<(), CallError>) {
        let Some((expected, saved)) = self.in_flight.take() else {
            debug!(ticket, "save reply with nothing in flight");
            return;
        };
        if expected != ticket {
            debug!(ticket, expected, "ignoring superseded save reply");
            self.in_flight = Some((expected, saved));
            return;
        }

        match result {
            Ok(()) => {
                info!(ticket, "settings saved");
                if self.phase == SettingsPhase::Saving {
                    self.baseline = saved;
                    self.phase = SettingsPhase::Synced;
                }
            }
            Err(err) => {
                warn!(ticket, "settings save failed: {}", err);
                self.error = Some(err.to_string());
                if self.phase == SettingsPhase::Saving {
                    self.phase = SettingsPhase::Dirty;
                }
            }
        }
    }

    /// A configuration pushed by the host. It wins over local edits, pending
    /// or in flight.
    pub fn on_external(&mut self, config: ConfigSnapshot) -> Vec<SettingsAction> {
        if self.phase == SettingsPhase::Uninitialized {
            return Vec::new();
        }
        if matches!(self.phase, SettingsPhase::Dirty | SettingsPhase::Saving) && self.form != config {
            info!("pushed configuration overwrites local settings edits");
        }

        let mut actions = Vec::new();
        let locale = self.resolve(&config.language);
        if locale != self.locale {
            self.locale = locale.clone();
            actions.push(SettingsAction::SetLocale(locale));
        }
        if config.material_effect != self.form.material_effect
            || config.theme_mode != self.form.theme_mode
        {
            actions.push(SettingsAction::ApplyEffects {
                effect: config.material_effect,
                theme: config.theme_mode,
            });
        }

        self.form = config.clone();
        self.baseline = config;
        self.phase = SettingsPhase::Synced;
        actions
    }

    fn effects_action(&self) -> SettingsAction {
        SettingsAction::ApplyEffects {
            effect: self.form.material_effect,
            theme: self.form.theme_mode,
        }
    }

    fn resolve(&self, language: &Language) -> String {
        resolve_locale_with(language, |var| (self.env)(var))
    }
}
