//! Settings Persistence System
//!
//! Persistent client configuration with:
//! - Atomic file writes (temp file + rename)
//! - Tolerant loading (invalid values are clamped, invalid files fall back
//!   to defaults)
//! - Migration support for schema changes
//!
//! Storage location: {config_dir}/kickscope/settings.json
//!
//! Only user configuration lives here. Analysis state is never persisted.

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::analysis::{
    validate_base_url, PollerConfig, DEFAULT_API_URL, DEFAULT_MAX_POLLS, DEFAULT_TRANSPORT_RETRIES,
};
use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Directory created under the platform config directory
pub const APP_DIR_NAME: &str = "kickscope";

/// Environment variable overriding the stored API URL
pub const API_URL_ENV: &str = "KICKSCOPE_API_URL";

/// Platform settings directory, e.g. `~/.config/kickscope` on Linux
pub fn default_settings_dir() -> CoreResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| CoreError::Settings("No configuration directory on this platform".into()))
}

/// API URL from the environment, if set and non-blank
pub fn api_url_from_env() -> Option<String> {
    std::env::var(API_URL_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// =============================================================================
// ClientSettings
// =============================================================================

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Settings schema version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Base URL of the analysis service
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Delay between status checks in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Status checks before giving up
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Consecutive transient failures retried while polling
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Per-request timeout in seconds (covers uploads)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_polls() -> u32 {
    DEFAULT_MAX_POLLS
}

fn default_transport_retries() -> u32 {
    DEFAULT_TRANSPORT_RETRIES
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            api_url: default_api_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            transport_retries: default_transport_retries(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Values given on the command line, applied over stored settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub api_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

impl ClientSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Corrects bad values instead of failing, so a hand-edited file never
    /// locks the user out.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.api_url = match validate_base_url(&self.api_url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Replacing invalid API URL with the default: {}", e);
                default_api_url()
            }
        };
        self.poll_interval_ms = self.poll_interval_ms.clamp(250, 60_000);
        self.max_polls = self.max_polls.clamp(1, 100_000);
        self.transport_retries = self.transport_retries.clamp(0, 10);
        self.request_timeout_secs = self.request_timeout_secs.clamp(5, 3600);
    }

    /// Applies overrides in precedence order: command line, then the
    /// environment, then what was stored.
    ///
    /// An explicitly given API URL must be valid.
    pub fn resolve(
        mut self,
        overrides: &SettingsOverrides,
        env_api_url: Option<&str>,
    ) -> CoreResult<Self> {
        if let Some(url) = overrides.api_url.as_deref().or(env_api_url) {
            self.api_url = validate_base_url(url)?;
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(max_polls) = overrides.max_polls {
            self.max_polls = max_polls;
        }
        self.normalize();
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig::default()
            .with_interval(self.poll_interval())
            .with_max_polls(self.max_polls)
            .with_transport_retries(self.transport_retries)
    }
}

// =============================================================================
// SettingsManager
// =============================================================================

/// Settings manager for loading, saving, and resetting settings
#[derive(Debug)]
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager storing its file in `settings_dir`
    pub fn new(settings_dir: PathBuf) -> Self {
        Self {
            settings_path: settings_dir.join(SETTINGS_FILE),
        }
    }

    /// Settings manager for the platform settings directory
    pub fn for_platform() -> CoreResult<Self> {
        Ok(Self::new(default_settings_dir()?))
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| CoreError::Settings(format!("Failed to open settings lock file: {}", e)))?;

        let locked = if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)
        } else {
            fs2::FileExt::lock_shared(&lock_file)
        };
        locked.map_err(|e| CoreError::Settings(format!("Failed to lock settings file: {}", e)))?;

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing
    /// or unreadable
    pub fn load(&self) -> ClientSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(ClientSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<ClientSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = migrate(settings);
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                ClientSettings::default()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename).
    ///
    /// Returns the normalized settings that were written.
    pub fn save(&self, settings: &ClientSettings) -> CoreResult<ClientSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)?;

            // std::fs::rename does not overwrite on Windows.
            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path).map_err(|e| {
                CoreError::Settings(format!("Failed to create temp settings file: {}", e))
            })?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            if cfg!(windows) {
                let backup_path = self.settings_path.with_extension("json.bak");
                if backup_path.exists() {
                    let _ = fs::remove_file(&backup_path);
                }

                if self.settings_path.exists() {
                    fs::rename(&self.settings_path, &backup_path).map_err(|e| {
                        CoreError::Settings(format!("Failed to backup settings file: {}", e))
                    })?;
                }

                if let Err(e) = fs::rename(&temp_path, &self.settings_path) {
                    if backup_path.exists() {
                        let _ = fs::rename(&backup_path, &self.settings_path);
                    }
                    return Err(CoreError::Settings(format!(
                        "Failed to finalize settings file: {}",
                        e
                    )));
                }
                if backup_path.exists() {
                    let _ = fs::remove_file(&backup_path);
                }
            } else {
                fs::rename(&temp_path, &self.settings_path).map_err(|e| {
                    CoreError::Settings(format!("Failed to finalize settings file: {}", e))
                })?;
            }

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Loads, modifies and saves settings in one step
    pub fn update(&self, op: impl FnOnce(&mut ClientSettings)) -> CoreResult<ClientSettings> {
        let mut settings = self.load();
        op(&mut settings);
        self.save(&settings)
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<ClientSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(ClientSettings::default())
        })
    }
}

/// Migrate settings from an older schema version
fn migrate(mut settings: ClientSettings) -> ClientSettings {
    settings.version = SETTINGS_VERSION;
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = ClientSettings::default();
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.poll_interval_ms, 2000);
        assert_eq!(settings.max_polls, 900);
        assert_eq!(settings.transport_retries, 2);
        assert_eq!(settings.version, SETTINGS_VERSION);
    }

    #[test]
    fn test_settings_serialize_camel_case() {
        let json = serde_json::to_value(ClientSettings::default()).unwrap();
        assert_eq!(json["apiUrl"], DEFAULT_API_URL);
        assert_eq!(json["pollIntervalMs"], 2000);
        assert_eq!(json["requestTimeoutSecs"], 300);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        assert_eq!(manager.load(), ClientSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        let settings = ClientSettings {
            api_url: "http://localhost:5000/api/analysis/".to_string(),
            max_polls: 30,
            ..Default::default()
        };
        let saved = manager.save(&settings).unwrap();
        assert_eq!(saved.api_url, "http://localhost:5000/api/analysis");

        let loaded = manager.load();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.max_polls, 30);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());

        manager.save(&ClientSettings::default()).unwrap();
        manager.save(&ClientSettings::default()).unwrap();

        assert!(!manager.settings_path().with_extension("json.tmp").exists());
        assert!(manager.settings_path().exists());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        let manager = SettingsManager::new(nested.clone());

        manager.save(&ClientSettings::default()).unwrap();
        assert!(nested.join(SETTINGS_FILE).exists());
    }

    #[test]
    fn test_reset_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path().to_path_buf());
        manager
            .update(|s| s.api_url = "http://localhost:5000".to_string())
            .unwrap();
        assert!(manager.settings_path().exists());

        let reset = manager.reset().unwrap();
        assert!(!manager.settings_path().exists());
        assert_eq!(reset, ClientSettings::default());
    }

    #[test]
    fn test_invalid_json_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(SETTINGS_FILE), "invalid json {{{").unwrap();

        let manager = SettingsManager::new(temp_dir.path().to_path_buf());
        assert_eq!(manager.load(), ClientSettings::default());
    }

    #[test]
    fn test_partial_json_uses_defaults_for_missing() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            r#"{"apiUrl": "https://example.com/api", "unknownField": true}"#,
        )
        .unwrap();

        let settings = SettingsManager::new(temp_dir.path().to_path_buf()).load();
        assert_eq!(settings.api_url, "https://example.com/api");
        assert_eq!(settings.poll_interval_ms, 2000);
        assert_eq!(settings.version, SETTINGS_VERSION);
    }

    #[test]
    fn test_normalization_clamps_values() {
        let mut settings = ClientSettings {
            version: 0,
            api_url: "ftp://example.com".to_string(),
            poll_interval_ms: 1,
            max_polls: 0,
            transport_retries: 99,
            request_timeout_secs: 1_000_000,
        };
        settings.normalize();

        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.max_polls, 1);
        assert_eq!(settings.transport_retries, 10);
        assert_eq!(settings.request_timeout_secs, 3600);
    }

    #[test]
    fn test_resolve_precedence() {
        let stored = ClientSettings {
            api_url: "https://stored.example.com".to_string(),
            ..Default::default()
        };

        let from_env = stored
            .clone()
            .resolve(&SettingsOverrides::default(), Some("https://env.example.com/"))
            .unwrap();
        assert_eq!(from_env.api_url, "https://env.example.com");

        let overrides = SettingsOverrides {
            api_url: Some("http://localhost:5000".to_string()),
            poll_interval_ms: Some(500),
            max_polls: Some(10),
        };
        let from_flag = stored
            .clone()
            .resolve(&overrides, Some("https://env.example.com"))
            .unwrap();
        assert_eq!(from_flag.api_url, "http://localhost:5000");
        assert_eq!(from_flag.poll_interval_ms, 500);
        assert_eq!(from_flag.max_polls, 10);

        let untouched = stored.clone().resolve(&SettingsOverrides::default(), None).unwrap();
        assert_eq!(untouched.api_url, "https://stored.example.com");
    }

    #[test]
    fn test_resolve_rejects_invalid_explicit_url() {
        let overrides = SettingsOverrides {
            api_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(ClientSettings::default().resolve(&overrides, None).is_err());
    }

    #[test]
    fn test_poller_config_follows_settings() {
        let settings = ClientSettings {
            poll_interval_ms: 750,
            max_polls: 12,
            transport_retries: 0,
            ..Default::default()
        };
        let config = settings.poller_config();
        assert_eq!(config.interval, Duration::from_millis(750));
        assert_eq!(config.max_polls, 12);
        assert_eq!(config.transport_retries, 0);
    }

    #[test]
    fn test_concurrent_read_write() {
        use std::sync::Arc;
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(SettingsManager::new(temp_dir.path().to_path_buf()));
        manager.save(&ClientSettings::default()).unwrap();

        let mut handles = vec![];
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                for _ in 0..10 {
                    let _ = manager.load();
                }
            }));
        }
        for i in 0..3u32 {
            let manager = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                for j in 0..5u32 {
                    let settings = ClientSettings {
                        max_polls: i * 10 + j,
                        ..Default::default()
                    };
                    let _ = manager.save(&settings);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        let settings = manager.load();
        assert!((1..=100_000).contains(&settings.max_polls));
    }
}
