use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use clipsync_core::ConfigSnapshot;
use tracing::warn;

/// `config.json` is expected to be tiny; anything larger is treated as
/// corrupt rather than read into memory.
pub const MAX_CONFIG_BYTES: u64 = 64 * 1024;
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug)]
pub enum StoreLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for StoreLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            StoreLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            StoreLoadError::Read(e) => write!(f, "read failed: {e}"),
            StoreLoadError::Parse(e) => write!(f, "parse failed: {e}"),
        }
    }
}

impl std::error::Error for StoreLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreLoadError::Metadata(e) => Some(e),
            StoreLoadError::Read(e) => Some(e),
            StoreLoadError::Parse(e) => Some(e),
            StoreLoadError::TooLarge { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum StoreSaveError {
    Serialize(serde_json::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for StoreSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            StoreSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            StoreSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for StoreSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreSaveError::Serialize(e) => Some(e),
            StoreSaveError::WriteTmp(e) => Some(e),
            StoreSaveError::Rename(e) => Some(e),
        }
    }
}

/// Default data directory: `CLIPSYNC_CONFIG_DIR`, else the platform's local
/// application data directory, else the working directory.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CLIPSYNC_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    let base = std::env::var_os("LOCALAPPDATA")
        .or_else(|| std::env::var_os("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("ClipSync")
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        let _ = fs::create_dir_all(dir);
        Self::new(dir.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<ConfigSnapshot>, StoreLoadError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let meta = fs::metadata(&self.path).map_err(StoreLoadError::Metadata)?;
        if meta.len() > MAX_CONFIG_BYTES {
            return Err(StoreLoadError::TooLarge {
                size: meta.len(),
                max: MAX_CONFIG_BYTES,
            });
        }

        let data = fs::read_to_string(&self.path).map_err(StoreLoadError::Read)?;
        serde_json::from_str(&data)
            .map(Some)
            .map_err(StoreLoadError::Parse)
    }

    pub fn load_or_default(&self) -> ConfigSnapshot {
        match self.load() {
            Ok(Some(config)) => config,
            Ok(None) => ConfigSnapshot::default(),
            Err(err) => {
                warn!(path = %self.path.display(), "saved config invalid, using defaults: {}", err);
                ConfigSnapshot::default()
            }
        }
    }

    pub fn save(&self, config: &ConfigSnapshot) -> Result<(), StoreSaveError> {
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(config).map_err(StoreSaveError::Serialize)?;
        fs::write(&tmp, payload.as_bytes()).map_err(StoreSaveError::WriteTmp)?;

        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }

        fs::rename(&tmp, &self.path).map_err(StoreSaveError::Rename)?;
        Ok(())
    }

    pub fn save_with_retry(&self, config: &ConfigSnapshot) -> Result<(), StoreSaveError> {
        const MAX_ATTEMPTS: u32 = 3;
        const BACKOFF_BASE_MS: u64 = 50;

        let mut attempt: u32 = 1;
        loop {
            match self.save(config) {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
                Err(err) => {
                    warn!(attempt, "config save failed, retrying: {}", err);
                    let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                    attempt += 1;
                }
            }
        }
    }
}
