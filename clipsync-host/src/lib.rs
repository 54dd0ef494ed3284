//! The authority process: owns configuration and connection state, runs the
//! command surface and serves windows over WebSocket.

pub mod bus;
pub mod host;
pub mod local;
pub mod logging;
pub mod server;
pub mod shell;
pub mod store;
pub mod tray;
pub mod validate;

pub use bus::{DEFAULT_BUS_CAPACITY, EventBus};
pub use host::{Host, HostOptions};
pub use local::LocalTransport;
pub use server::{build_router, serve};
pub use shell::{DesktopShell, SystemShell};
pub use store::{ConfigStore, default_config_dir};
pub use tray::{TrayController, TrayIcon, TrayMenuItem, TrayOutcome};
pub use validate::validate_settings;
