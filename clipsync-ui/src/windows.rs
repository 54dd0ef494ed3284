//! Window singleton control: at most one live window per label.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use clipsync_core::{CloseBehavior, WindowLabel};
use thiserror::Error;
use tracing::{debug, info, warn};

pub type WindowId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub label: WindowLabel,
    pub title: &'static str,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl WindowSpec {
    pub fn for_label(label: WindowLabel) -> Self {
        match label {
            WindowLabel::Main => Self {
                label,
                title: "ClipSync",
                width: 800,
                height: 600,
                resizable: false,
            },
            WindowLabel::Settings => Self {
                label,
                title: "ClipSync Settings",
                width: 520,
                height: 640,
                resizable: false,
            },
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("failed to create {label} window: {reason}")]
    Create { label: WindowLabel, reason: String },
    #[error("window {0} no longer exists")]
    Gone(WindowId),
    #[error("window registry unavailable")]
    Poisoned,
}

/// The windowing system the front end runs on.
pub trait WindowHost: Send + Sync {
    fn create(&self, spec: &WindowSpec) -> Result<WindowId, WindowError>;

    fn focus(&self, id: WindowId) -> Result<(), WindowError>;

    /// `false` once the window has been destroyed by any path.
    fn is_alive(&self, id: WindowId) -> bool;

    fn hide(&self, id: WindowId) -> Result<(), WindowError>;

    fn minimize(&self, id: WindowId) -> Result<(), WindowError>;

    fn close(&self, id: WindowId) -> Result<(), WindowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Created(WindowId),
    Focused(WindowId),
}

impl OpenOutcome {
    pub fn id(self) -> WindowId {
        match self {
            OpenOutcome::Created(id) | OpenOutcome::Focused(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Window hidden; its instance stays registered.
    Hide,
    Minimize,
    /// Window destroyed and its slot released.
    Close,
    /// The whole front end should exit.
    Quit,
}

/// What closing `label` does under `behavior`. Only the main window honours
/// the close behavior setting.
pub fn close_action(label: WindowLabel, behavior: CloseBehavior) -> CloseAction {
    match (label, behavior) {
        (WindowLabel::Settings, _) => CloseAction::Close,
        (WindowLabel::Main, CloseBehavior::MinimizeToTray) => CloseAction::Hide,
        (WindowLabel::Main, CloseBehavior::Minimize) => CloseAction::Minimize,
        (WindowLabel::Main, CloseBehavior::Quit) => CloseAction::Quit,
    }
}

pub struct WindowRegistry<H> {
    host: H,
    windows: Mutex<HashMap<WindowLabel, WindowId>>,
}

impl<H: WindowHost> WindowRegistry<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Focuses the live window for `label`, or creates it. Lookup and
    /// creation happen under one lock, so concurrent requests never create
    /// two instances.
    pub fn open_or_focus(&self, label: WindowLabel) -> Result<OpenOutcome, WindowError> {
        let mut windows = self.windows.lock().map_err(|_| WindowError::Poisoned)?;

        if let Some(&id) = windows.get(&label) {
            if self.host.is_alive(id) {
                match self.host.focus(id) {
                    Ok(()) => {
                        debug!(label = %label, id, "focused existing window");
                        return Ok(OpenOutcome::Focused(id));
                    }
                    Err(err) => warn!(label = %label, id, "focus failed, recreating: {}", err),
                }
            } else {
                debug!(label = %label, id, "dropping stale window entry");
            }
            windows.remove(&label);
        }

        let spec = WindowSpec::for_label(label);
        let id = self.host.create(&spec)?;
        windows.insert(label, id);
        info!(label = %label, id, "window created");
        Ok(OpenOutcome::Created(id))
    }

    /// The live window for `label`, if any.
    pub fn get(&self, label: WindowLabel) -> Option<WindowId> {
        let windows = self.windows.lock().ok()?;
        windows
            .get(&label)
            .copied()
            .filter(|&id| self.host.is_alive(id))
    }

    /// Releases the slot after the window has been destroyed.
    pub fn mark_closed(&self, label: WindowLabel) {
        if let Ok(mut windows) = self.windows.lock()
            && windows.remove(&label).is_some()
        {
            debug!(label = %label, "window slot released");
        }
    }

    /// Carries out a close request for `label` and reports what happened.
    pub fn request_close(
        &self,
        label: WindowLabel,
        behavior: CloseBehavior,
    ) -> Result<CloseAction, WindowError> {
        let action = close_action(label, behavior);
        let Some(id) = self.get(label) else {
            self.mark_closed(label);
            return Ok(CloseAction::Close);
        };

        match action {
            CloseAction::Hide => self.host.hide(id)?,
            CloseAction::Minimize => self.host.minimize(id)?,
            CloseAction::Close | CloseAction::Quit => {
                self.host.close(id)?;
                self.mark_closed(label);
            }
        }
        info!(label = %label, ?action, "close requested");
        Ok(action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessWindow {
    pub spec: WindowSpec,
    pub visible: bool,
    pub minimized: bool,
    pub focus_count: u32,
}

/// Windowing backend without a display. Windows are bookkeeping entries.
#[derive(Debug, Default)]
pub struct HeadlessWindows {
    next_id: AtomicU64,
    windows: Mutex<HashMap<WindowId, HeadlessWindow>>,
}

impl HeadlessWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, id: WindowId) -> Option<HeadlessWindow> {
        self.windows.lock().ok()?.get(&id).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Destroys a window behind the registry's back, as the OS chrome can.
    pub fn destroy(&self, id: WindowId) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.remove(&id);
        }
    }

    fn update(&self, id: WindowId, change: impl FnOnce(&mut HeadlessWindow)) -> Result<(), WindowError> {
        let mut windows = self.windows.lock().map_err(|_| WindowError::Poisoned)?;
        let window = windows.get_mut(&id).ok_or(WindowError::Gone(id))?;
        change(window);
        Ok(())
    }
}

impl WindowHost for HeadlessWindows {
    fn create(&self, spec: &WindowSpec) -> Result<WindowId, WindowError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut windows = self.windows.lock().map_err(|_| WindowError::Poisoned)?;
        windows.insert(
            id,
            HeadlessWindow {
                spec: *spec,
                visible: true,
                minimized: false,
                focus_count: 0,
            },
        );
        Ok(id)
    }

    fn focus(&self, id: WindowId) -> Result<(), WindowError> {
        self.update(id, |window| {
            window.visible = true;
            window.minimized = false;
            window.focus_count += 1;
        })
    }

    fn is_alive(&self, id: WindowId) -> bool {
        self.windows
            .lock()
            .map(|windows| windows.contains_key(&id))
            .unwrap_or(false)
    }

    fn hide(&self, id: WindowId) -> Result<(), WindowError> {
        self.update(id, |window| window.visible = false)
    }

    fn minimize(&self, id: WindowId) -> Result<(), WindowError> {
        self.update(id, |window| window.minimized = true)
    }

    fn close(&self, id: WindowId) -> Result<(), WindowError> {
        let mut windows = self.windows.lock().map_err(|_| WindowError::Poisoned)?;
        windows.remove(&id).map(|_| ()).ok_or(WindowError::Gone(id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    struct BrokenHost;

    impl WindowHost for BrokenHost {
        fn create(&self, spec: &WindowSpec) -> Result<WindowId, WindowError> {
            Err(WindowError::Create {
                label: spec.label,
                reason: "no display".to_owned(),
            })
        }
        fn focus(&self, id: WindowId) -> Result<(), WindowError> {
            Err(WindowError::Gone(id))
        }
        fn is_alive(&self, _id: WindowId) -> bool {
            false
        }
        fn hide(&self, id: WindowId) -> Result<(), WindowError> {
            Err(WindowError::Gone(id))
        }
        fn minimize(&self, id: WindowId) -> Result<(), WindowError> {
            Err(WindowError::Gone(id))
        }
        fn close(&self, id: WindowId) -> Result<(), WindowError> {
            Err(WindowError::Gone(id))
        }
    }

    #[test]
    fn second_open_focuses_the_first() {
        let registry = WindowRegistry::new(HeadlessWindows::new());
        let first = registry.open_or_focus(WindowLabel::Settings).unwrap();
        let second = registry.open_or_focus(WindowLabel::Settings).unwrap();

        assert!(matches!(first, OpenOutcome::Created(_)));
        assert_eq!(second, OpenOutcome::Focused(first.id()));
        assert_eq!(registry.host().live_count(), 1);
        assert_eq!(registry.host().window(first.id()).unwrap().focus_count, 1);
    }

    #[test]
    fn windows_get_fixed_specs() {
        let registry = WindowRegistry::new(HeadlessWindows::new());
        let id = registry.open_or_focus(WindowLabel::Settings).unwrap().id();
        let spec = registry.host().window(id).unwrap().spec;
        assert_eq!((spec.width, spec.height, spec.resizable), (520, 640, false));

        let id = registry.open_or_focus(WindowLabel::Main).unwrap().id();
        let spec = registry.host().window(id).unwrap().spec;
        assert_eq!((spec.width, spec.height, spec.resizable), (800, 600, false));
    }

    #[test]
    fn stale_entry_counts_as_absent() {
        let registry = WindowRegistry::new(HeadlessWindows::new());
        let first = registry.open_or_focus(WindowLabel::Settings).unwrap().id();
        registry.host().destroy(first);

        let reopened = registry.open_or_focus(WindowLabel::Settings).unwrap();
        assert!(matches!(reopened, OpenOutcome::Created(id) if id != first));
    }

    #[test]
    fn concurrent_opens_create_one_window() {
        let registry = Arc::new(WindowRegistry::new(HeadlessWindows::new()));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.open_or_focus(WindowLabel::Settings).unwrap().id()
                })
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(registry.host().live_count(), 1);
    }

    #[test]
    fn creation_failure_is_reported() {
        let registry = WindowRegistry::new(BrokenHost);
        let err = registry.open_or_focus(WindowLabel::Settings).unwrap_err();
        assert_eq!(err.to_string(), "failed to create settings window: no display");
        assert!(registry.get(WindowLabel::Settings).is_none());
    }

    #[test]
    fn close_behavior_applies_to_main_only() {
        let registry = WindowRegistry::new(HeadlessWindows::new());
        let main = registry.open_or_focus(WindowLabel::Main).unwrap().id();
        let settings = registry.open_or_focus(WindowLabel::Settings).unwrap().id();

        let action = registry
            .request_close(WindowLabel::Main, CloseBehavior::MinimizeToTray)
            .unwrap();
        assert_eq!(action, CloseAction::Hide);
        assert!(!registry.host().window(main).unwrap().visible);
        assert_eq!(registry.get(WindowLabel::Main), Some(main));

        let action = registry
            .request_close(WindowLabel::Settings, CloseBehavior::Quit)
            .unwrap();
        assert_eq!(action, CloseAction::Close);
        assert!(registry.host().window(settings).is_none());
        assert!(registry.get(WindowLabel::Settings).is_none());

        assert_eq!(
            close_action(WindowLabel::Main, CloseBehavior::Minimize),
            CloseAction::Minimize
        );
        assert_eq!(
            close_action(WindowLabel::Main, CloseBehavior::Quit),
            CloseAction::Quit
        );
    }
}
