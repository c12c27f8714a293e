// SPDX-License-Identifier: MPL-2.0
//! This module handles the player's configuration: loading optional
//! preferences from a `settings.toml` file and resolving them into validated
//! [`PlaybackSettings`].
//!
//! # Examples
//!
//! ```no_run
//! use lens_player::config::{self, Config};
//! use lens_player::video_player::SyncMode;
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.sync_mode = Some(SyncMode::Audio);
//!
//! let settings = config.playback_settings();
//! assert_eq!(settings.sync_mode, SyncMode::Audio);
//! ```

pub mod defaults;

pub use defaults::*;

use crate::error::Result;
use crate::video_player::SyncMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "LensPlayer";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync_mode: Option<SyncMode>,
    #[serde(default)]
    pub max_pending_buffers: Option<usize>,
    #[serde(default)]
    pub backpressure_poll_ms: Option<u64>,
    #[serde(default)]
    pub pacing_slack_ms: Option<u64>,
    #[serde(default)]
    pub max_pacing_sleep_ms: Option<u64>,
    #[serde(default)]
    pub window_title: Option<String>,
    #[serde(default)]
    pub vsync: Option<bool>,
    #[serde(default)]
    pub audio_enabled: Option<bool>,
}

/// Validated playback parameters derived from a [`Config`].
///
/// Every value is clamped into its allowed range, so consumers never see
/// a zero-length queue or a zero sleep clamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub sync_mode: SyncMode,
    pub max_pending_buffers: usize,
    pub backpressure_poll: Duration,
    pub pacing_slack: Duration,
    pub max_pacing_sleep: Duration,
    pub window_title: Option<String>,
    pub vsync: bool,
    pub audio_enabled: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Config::default().playback_settings()
    }
}

impl Config {
    /// Resolves optional fields against defaults and clamps them to valid ranges.
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            sync_mode: self.sync_mode.unwrap_or_default(),
            max_pending_buffers: self
                .max_pending_buffers
                .unwrap_or(DEFAULT_MAX_PENDING_BUFFERS)
                .clamp(MIN_MAX_PENDING_BUFFERS, MAX_MAX_PENDING_BUFFERS),
            backpressure_poll: Duration::from_millis(
                self.backpressure_poll_ms
                    .unwrap_or(DEFAULT_BACKPRESSURE_POLL_MS)
                    .clamp(MIN_BACKPRESSURE_POLL_MS, MAX_BACKPRESSURE_POLL_MS),
            ),
            pacing_slack: Duration::from_millis(
                self.pacing_slack_ms
                    .unwrap_or(DEFAULT_PACING_SLACK_MS)
                    .min(MAX_PACING_SLACK_MS),
            ),
            max_pacing_sleep: Duration::from_millis(
                self.max_pacing_sleep_ms
                    .unwrap_or(DEFAULT_MAX_PACING_SLEEP_MS)
                    .clamp(MIN_MAX_PACING_SLEEP_MS, MAX_MAX_PACING_SLEEP_MS),
            ),
            window_title: self
                .window_title
                .as_ref()
                .filter(|title| !title.trim().is_empty())
                .cloned(),
            vsync: self.vsync.unwrap_or(DEFAULT_VSYNC),
            audio_enabled: self.audio_enabled.unwrap_or(true),
        }
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            log::warn!("Ignoring invalid config {}: {e}", path.display());
            Ok(Config::default())
        }
    }
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_preserves_sync_mode() {
        let config = Config {
            sync_mode: Some(SyncMode::Audio),
            max_pending_buffers: Some(16),
            window_title: Some("clip".to_string()),
            ..Config::default()
        };
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        save_to_path(&config, &config_path).expect("failed to save config");
        let loaded = load_from_path(&config_path).expect("failed to load config");

        assert_eq!(loaded, config);
    }

    #[test]
    fn load_from_path_returns_default_on_invalid_toml() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "not = valid = toml").expect("failed to write invalid toml");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn load_from_path_errors_on_missing_file() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let result = load_from_path(&temp_dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn sync_mode_parses_lowercase_names() {
        let config: Config = toml::from_str("sync_mode = \"audio\"").expect("valid toml");
        assert_eq!(config.sync_mode, Some(SyncMode::Audio));
    }

    #[test]
    fn default_settings_match_defaults_module() {
        let settings = PlaybackSettings::default();
        assert_eq!(settings.sync_mode, SyncMode::Video);
        assert_eq!(settings.max_pending_buffers, DEFAULT_MAX_PENDING_BUFFERS);
        assert_eq!(settings.backpressure_poll, Duration::from_millis(2));
        assert_eq!(settings.pacing_slack, Duration::from_millis(3));
        assert_eq!(settings.max_pacing_sleep, Duration::from_millis(300));
        assert!(settings.vsync);
        assert!(settings.audio_enabled);
        assert!(settings.window_title.is_none());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = Config {
            max_pending_buffers: Some(0),
            backpressure_poll_ms: Some(0),
            pacing_slack_ms: Some(10_000),
            max_pacing_sleep_ms: Some(60_000),
            window_title: Some("   ".to_string()),
            ..Config::default()
        };
        let settings = config.playback_settings();

        assert_eq!(settings.max_pending_buffers, MIN_MAX_PENDING_BUFFERS);
        assert_eq!(
            settings.backpressure_poll,
            Duration::from_millis(MIN_BACKPRESSURE_POLL_MS)
        );
        assert_eq!(
            settings.pacing_slack,
            Duration::from_millis(MAX_PACING_SLACK_MS)
        );
        assert_eq!(
            settings.max_pacing_sleep,
            Duration::from_millis(MAX_MAX_PACING_SLEEP_MS)
        );
        assert!(settings.window_title.is_none());
    }
}
