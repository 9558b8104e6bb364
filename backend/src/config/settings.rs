//! User settings: screen aspect ratio and the enable switch
//!
//! Read fresh at every playback start so a change applies to the next item
//! without restarting the service.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Screen ratio used when the setting is missing or unparseable (2.40:1 scope screen)
pub const DEFAULT_SCREEN_RATIO: f64 = 2.40;

pub const TARGET_AR_KEY: &str = "AUTOFIT_TARGET_AR";
pub const ENABLED_KEY: &str = "AUTOFIT_ENABLED";

/// Settings snapshot for one playback session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenConfig {
    pub aspect_ratio: f64,
    pub enabled: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: DEFAULT_SCREEN_RATIO,
            enabled: true,
        }
    }
}

pub trait SettingsStore: Send + Sync {
    fn screen_aspect_ratio(&self) -> f64;

    fn is_enabled(&self) -> bool;

    /// Take a snapshot for a new session
    fn screen_config(&self) -> ScreenConfig {
        ScreenConfig {
            aspect_ratio: self.screen_aspect_ratio(),
            enabled: self.is_enabled(),
        }
    }
}

/// Settings from the process environment, optionally overridden by a
/// KEY=VALUE file that is re-read on every call.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    file: Option<PathBuf>,
}

impl EnvSettings {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    fn value(&self, key: &str) -> Option<String> {
        self.file_values()
            .remove(key)
            .or_else(|| env::var(key).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn file_values(&self) -> HashMap<String, String> {
        let Some(path) = &self.file else {
            return HashMap::new();
        };

        match dotenvy::from_path_iter(path) {
            Ok(iter) => iter.filter_map(Result::ok).collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings file");
                HashMap::new()
            }
        }
    }
}

impl SettingsStore for EnvSettings {
    fn screen_aspect_ratio(&self) -> f64 {
        let raw = self.value(TARGET_AR_KEY);
        parse_screen_ratio(raw.as_deref())
    }

    fn is_enabled(&self) -> bool {
        parse_enabled(self.value(ENABLED_KEY).as_deref())
    }
}

/// Parse the target ratio setting, falling back to 2.40 on anything unusable
pub fn parse_screen_ratio(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return DEFAULT_SCREEN_RATIO;
    };

    match crate::media::parse_ratio(raw) {
        Some(ratio) => ratio,
        None => {
            warn!(
                value = %raw,
                default = DEFAULT_SCREEN_RATIO,
                "Could not parse target screen ratio, using default"
            );
            DEFAULT_SCREEN_RATIO
        }
    }
}

/// Enabled unless explicitly switched off
pub fn parse_enabled(raw: Option<&str>) -> bool {
    match raw.map(|v| v.to_lowercase()) {
        Some(v) => !matches!(v.as_str(), "false" | "0" | "no" | "off"),
        None => true,
    }
}
