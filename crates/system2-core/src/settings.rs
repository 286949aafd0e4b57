//! Settings persistence

use crate::error::Result;
use crate::types::Settings;
use std::path::{Path, PathBuf};

/// Get the settings file path
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("system2")
        .join("settings.json")
}

/// Load settings from `path`.
///
/// A missing file yields the defaults; fields absent from the file keep
/// their default values.
pub fn load(path: &Path) -> Result<Settings> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No settings at {:?}, using defaults", path);
            Ok(Settings::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Load settings from the default location, falling back to defaults
pub fn load_or_default() -> Settings {
    let path = settings_path();
    match load(&path) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Failed to load settings from {:?}, using defaults: {}", path, e);
            Settings::default()
        }
    }
}

/// Save settings to `path`, creating its directory
pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
