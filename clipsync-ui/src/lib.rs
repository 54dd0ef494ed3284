//! Front end of ClipSync: keeps every window's view of the host's state
//! current and sends edits back to it.

pub mod app;
pub mod locale;
pub mod main_window;
pub mod mirror;
pub mod peers;
pub mod settings;
pub mod settings_window;
pub mod windows;
pub mod ws;

pub use app::{FrontEnd, MainHandle, SettingsHandle, WindowExit, WindowHandle};
pub use locale::{FALLBACK_LOCALE, SUPPORTED_LOCALES, normalize_locale, resolve_locale};
pub use main_window::{MainIntent, MainView};
pub use mirror::{MirrorSnapshot, MirrorUpdate, StateMirror};
pub use peers::{PeerRoster, panel_visible};
pub use settings::{FieldEdit, Selection, SettingsAction, SettingsEngine, SettingsPhase};
pub use settings_window::{SettingsIntent, SettingsView};
pub use windows::{
    CloseAction, HeadlessWindows, OpenOutcome, WindowError, WindowHost, WindowId, WindowRegistry,
    WindowSpec,
};
pub use ws::WsTransport;
