//! Owns the backend client and window registry and runs one controller task
//! per open window.

use std::sync::{Arc, Mutex};

use clipsync_core::{BackendClient, WindowLabel};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::{
    main_window::{MainIntent, MainView, run_main_window},
    settings_window::{SettingsIntent, SettingsView, run_settings_window},
    windows::{OpenOutcome, WindowError, WindowHost, WindowId, WindowRegistry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowExit {
    /// Window destroyed; the front end keeps running.
    Closed,
    /// The user asked the whole front end to exit.
    Quit,
}

/// Channels into a running window controller.
#[derive(Debug, Clone)]
pub struct WindowHandle<I, V> {
    pub id: WindowId,
    pub intents: mpsc::UnboundedSender<I>,
    pub view: watch::Receiver<V>,
}

pub type MainHandle = WindowHandle<MainIntent, MainView>;
pub type SettingsHandle = WindowHandle<SettingsIntent, SettingsView>;

struct Inner<H> {
    client: BackendClient,
    registry: WindowRegistry<H>,
    main: Mutex<Option<MainHandle>>,
    settings: Mutex<Option<SettingsHandle>>,
    exits: mpsc::UnboundedSender<(WindowLabel, WindowExit)>,
}

pub struct FrontEnd<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for FrontEnd<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: WindowHost + 'static> FrontEnd<H> {
    /// Returns the front end and the stream of window exits.
    pub fn new(
        client: BackendClient,
        host: H,
    ) -> (Self, mpsc::UnboundedReceiver<(WindowLabel, WindowExit)>) {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let front = Self {
            inner: Arc::new(Inner {
                client,
                registry: WindowRegistry::new(host),
                main: Mutex::new(None),
                settings: Mutex::new(None),
                exits: exits_tx,
            }),
        };
        (front, exits_rx)
    }

    pub fn client(&self) -> &BackendClient {
        &self.inner.client
    }

    pub fn registry(&self) -> &WindowRegistry<H> {
        &self.inner.registry
    }

    pub fn main(&self) -> Option<MainHandle> {
        self.inner.main.lock().ok()?.clone()
    }

    pub fn settings(&self) -> Option<SettingsHandle> {
        self.inner.settings.lock().ok()?.clone()
    }

    /// Focuses the window for `label` or creates it and starts its
    /// controller. Must be called from within the tokio runtime.
    pub fn open_or_focus(&self, label: WindowLabel) -> Result<OpenOutcome, WindowError> {
        match label {
            WindowLabel::Main => {
                let mut slot = self.inner.main.lock().map_err(|_| WindowError::Poisoned)?;
                let outcome = self.inner.registry.open_or_focus(label)?;
                if let OpenOutcome::Created(id) = outcome {
                    let (intents_tx, intents_rx) = mpsc::unbounded_channel();
                    let (view_tx, view_rx) = watch::channel(MainView::loading());
                    *slot = Some(WindowHandle {
                        id,
                        intents: intents_tx,
                        view: view_rx,
                    });
                    let front = self.clone();
                    tokio::spawn(async move {
                        let exit = run_main_window(front.clone(), intents_rx, view_tx).await;
                        front.release(label, id, exit);
                    });
                }
                Ok(outcome)
            }
            WindowLabel::Settings => {
                let mut slot = self
                    .inner
                    .settings
                    .lock()
                    .map_err(|_| WindowError::Poisoned)?;
                let outcome = self.inner.registry.open_or_focus(label)?;
                if let OpenOutcome::Created(id) = outcome {
                    let (intents_tx, intents_rx) = mpsc::unbounded_channel();
                    let (view_tx, view_rx) = watch::channel(SettingsView::loading());
                    *slot = Some(WindowHandle {
                        id,
                        intents: intents_tx,
                        view: view_rx,
                    });
                    let front = self.clone();
                    tokio::spawn(async move {
                        let exit = run_settings_window(front.clone(), intents_rx, view_tx).await;
                        front.release(label, id, exit);
                    });
                }
                Ok(outcome)
            }
        }
    }

    fn release(&self, label: WindowLabel, id: WindowId, exit: WindowExit) {
        let cleared = match label {
            WindowLabel::Main => clear_slot(&self.inner.main, id),
            WindowLabel::Settings => clear_slot(&self.inner.settings, id),
        };
        if cleared {
            self.inner.registry.mark_closed(label);
        }
        debug!(label = %label, id, ?exit, "window controller finished");
        info!(label = %label, "window closed");
        let _ = self.inner.exits.send((label, exit));
    }
}

/// Clears the slot only if it still belongs to window `id`.
fn clear_slot<I, V>(slot: &Mutex<Option<WindowHandle<I, V>>>, id: WindowId) -> bool {
    let Ok(mut slot) = slot.lock() else {
        return false;
    };
    if slot.as_ref().is_some_and(|handle| handle.id == id) {
        *slot = None;
        true
    } else {
        false
    }
}
