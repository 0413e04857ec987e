//! Persisted device selection.
//!
//! Settings are stored as pretty-printed JSON in the user's configuration
//! directory:
//! - Windows: `%APPDATA%\MultiOutputAudioRouter\config.json`
//! - Linux: `~/.config/MultiOutputAudioRouter/config.json`
//! - macOS: `~/Library/Application Support/MultiOutputAudioRouter/config.json`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::{DeviceId, RouterConfig, RouterError, SettingsError};

/// Directory name under the user's configuration directory.
pub const APP_DIR_NAME: &str = "MultiOutputAudioRouter";

/// Settings file name.
pub const SETTINGS_FILE_NAME: &str = "config.json";

/// User preferences that survive restarts.
///
/// # Example
///
/// ```
/// use audio_fanout::Settings;
///
/// let settings = Settings {
///     selected_device_ids: vec!["Speakers".into(), "Headphones".into()],
///     ..Default::default()
/// };
/// assert_eq!(settings.router_config().unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Settings {
    /// Devices to route to, in order.
    pub selected_device_ids: Vec<DeviceId>,
    /// Whether `fanout auto` should start routing.
    #[serde(rename = "AutoStartRouting")]
    pub auto_start: bool,
    /// When the settings were last written.
    pub last_saved: Option<DateTime<Utc>>,
}

impl Settings {
    /// Builds a router configuration from the saved selection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than two distinct devices are saved.
    pub fn router_config(&self) -> Result<RouterConfig, RouterError> {
        RouterConfig::new(self.selected_device_ids.iter().cloned())
    }
}

/// Storage for [`Settings`].
pub trait SettingsStore {
    /// Reads the settings. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Parse` if the file exists but cannot be read.
    fn load(&self) -> Result<Settings, SettingsError>;

    /// Writes the settings, stamping `last_saved`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file or its directory cannot be written.
    fn save(&self, settings: &mut Settings) -> Result<(), SettingsError>;

    /// Deletes the saved settings. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file exists but cannot be removed.
    fn clear(&self) -> Result<(), SettingsError>;

    /// Reads the settings, falling back to defaults on any error.
    fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("using default settings: {e}");
                Settings::default()
            }
        }
    }
}

/// A [`SettingsStore`] backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    /// Creates a store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the platform's default location.
    ///
    /// # Errors
    ///
    /// Returns `NoConfigDir` if the user's configuration directory cannot be
    /// determined.
    pub fn default_location() -> Result<Self, SettingsError> {
        let base = BaseDirs::new().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(
            base.config_dir().join(APP_DIR_NAME).join(SETTINGS_FILE_NAME),
        ))
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, settings: &mut Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        settings.last_saved = Some(Utc::now());
        let contents =
            serde_json::to_string_pretty(settings).map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, contents).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), SettingsError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonSettingsStore {
        JsonSettingsStore::new(dir.path().join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let settings = store.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.auto_start);
        assert!(settings.last_saved.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut settings = Settings {
            selected_device_ids: vec!["Speakers".into(), "Headphones".into()],
            auto_start: true,
            last_saved: None,
        };
        store.save(&mut settings).unwrap();
        assert!(settings.last_saved.is_some());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_file_uses_pascal_case_field_names() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut settings = Settings {
            selected_device_ids: vec!["A".into(), "B".into()],
            auto_start: true,
            last_saved: None,
        };
        store.save(&mut settings).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"SelectedDeviceIds\""));
        assert!(raw.contains("\"AutoStartRouting\": true"));
        assert!(raw.contains("\"LastSaved\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), r#"{ "SelectedDeviceIds": ["A", "B"] }"#).unwrap();

        let settings = store.load().unwrap();
        assert_eq!(settings.selected_device_ids.len(), 2);
        assert!(!settings.auto_start);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not json").unwrap();

        assert!(matches!(store.load(), Err(SettingsError::Parse { .. })));
        assert_eq!(store.load_or_default(), Settings::default());
    }

    #[test]
    fn test_clear_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&mut Settings::default()).unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_router_config_from_settings() {
        let settings = Settings {
            selected_device_ids: vec!["A".into(), "B".into(), "A".into()],
            ..Default::default()
        };
        assert_eq!(settings.router_config().unwrap().len(), 2);

        let single = Settings {
            selected_device_ids: vec!["A".into()],
            ..Default::default()
        };
        assert!(matches!(
            single.router_config(),
            Err(RouterError::InvalidConfig { .. })
        ));
    }
}
