use std::{io, path::Path, process::Command};

use clipsync_core::{MaterialEffect, ThemeMode};
use tracing::info;

/// Desktop integration the host delegates to: folders, window chrome, host
/// identity.
pub trait DesktopShell: Send + Sync {
    fn open_folder(&self, path: &Path) -> io::Result<()>;

    fn apply_window_effects(&self, effect: MaterialEffect, theme: ThemeMode) -> Result<(), String>;

    fn hostname(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

impl DesktopShell for SystemShell {
    fn open_folder(&self, path: &Path) -> io::Result<()> {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let opener = "xdg-open";

        Command::new(opener).arg(path).spawn().map(|_| ())
    }

    fn apply_window_effects(&self, effect: MaterialEffect, theme: ThemeMode) -> Result<(), String> {
        // Native material effects need a compositor hook; headless hosts only record the request.
        info!(?effect, ?theme, "window effects requested");
        Ok(())
    }

    fn hostname(&self) -> String {
        std::env::var("COMPUTERNAME")
            .ok()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|name| name.trim().to_owned())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown-host".to_owned())
    }
}
