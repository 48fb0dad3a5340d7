use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::capture::DEFAULT_CAMERA_DEVICE;
use crate::speech::DEFAULT_SPEECH_COMMAND;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPathError {
    MissingHomeDirectory,
}

const APP_DIR: &str = "cardloft";
const APP_CONFIG_FILE: &str = "config.json";

const DEFAULT_SCAN_INTERVAL_MS: u64 = 1500;
const DEFAULT_LONG_PRESS_MS: u64 = 2000;
const DEFAULT_FLIP_DURATION_MS: u64 = 600;

/// Settings from `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ocr_language: Option<String>,
    pub scan_interval_ms: Option<u64>,
    pub long_press_ms: Option<u64>,
    pub flip_duration_ms: Option<u64>,
    pub camera_device: Option<PathBuf>,
    pub speech_command: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn scan_interval(&self) -> Duration {
        positive_millis(self.scan_interval_ms, DEFAULT_SCAN_INTERVAL_MS)
    }

    pub fn long_press(&self) -> Duration {
        positive_millis(self.long_press_ms, DEFAULT_LONG_PRESS_MS)
    }

    pub fn flip_duration(&self) -> Duration {
        Duration::from_millis(self.flip_duration_ms.unwrap_or(DEFAULT_FLIP_DURATION_MS))
    }

    pub fn camera_device(&self) -> PathBuf {
        self.camera_device
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CAMERA_DEVICE))
    }

    pub fn speech_command(&self) -> &str {
        self.speech_command
            .as_deref()
            .filter(|command| !command.trim().is_empty())
            .unwrap_or(DEFAULT_SPEECH_COMMAND)
    }
}

// Zero would spin a timer thread; fall back to the default instead.
fn positive_millis(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.filter(|ms| *ms > 0).unwrap_or(default))
}

pub fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
