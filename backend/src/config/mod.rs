//! Service configuration management
//!
//! Tuning constants are loaded once from the environment at startup. The two
//! user-facing settings (screen ratio, enable flag) live in [`settings`] and
//! are re-read for every playback.

pub mod settings;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::bluray::{CatalogConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use crate::services::metadata::{DEFAULT_PLACEHOLDERS, ResolverConfig};
use crate::services::rate_limiter::RetryConfig;

pub use settings::{EnvSettings, ScreenConfig, SettingsStore};

/// Service configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Kodi JSON-RPC HTTP endpoint
    pub kodi_url: String,

    /// Kodi JSON-RPC TCP notification address (host:port)
    pub kodi_notify_addr: String,

    /// Kodi web server credentials
    pub kodi_user: Option<String>,
    pub kodi_password: Option<String>,

    /// Polls of the playing item before giving up on stable metadata
    pub metadata_max_attempts: u32,

    /// Delay between metadata polls
    pub metadata_retry_interval: Duration,

    /// Per-request timeout against the catalog
    pub lookup_request_timeout: Duration,

    /// Ceiling for a whole catalog lookup
    pub lookup_timeout: Duration,

    /// Attempts per catalog request
    pub lookup_max_attempts: u32,

    /// Minimum title similarity for a fuzzy catalog match
    pub lookup_min_similarity: f64,

    /// Catalog base URL
    pub bluray_base_url: String,

    /// Catalog quick-search country filter
    pub bluray_country: String,

    /// Optional KEY=VALUE file re-read for the user settings on every playback
    pub settings_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            kodi_url: env::var("KODI_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080/jsonrpc".to_string()),

            kodi_notify_addr: env::var("KODI_NOTIFY_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:9090".to_string()),

            kodi_user: env::var("KODI_USER").ok().filter(|v| !v.is_empty()),
            kodi_password: env::var("KODI_PASSWORD").ok().filter(|v| !v.is_empty()),

            metadata_max_attempts: parse_var("METADATA_MAX_ATTEMPTS", 10)?,

            metadata_retry_interval: Duration::from_millis(parse_var(
                "METADATA_RETRY_INTERVAL_MS",
                500,
            )?),

            lookup_request_timeout: Duration::from_secs(parse_var(
                "LOOKUP_REQUEST_TIMEOUT_SECS",
                10,
            )?),

            lookup_timeout: Duration::from_secs(parse_var("LOOKUP_TIMEOUT_SECS", 15)?),

            lookup_max_attempts: parse_var("LOOKUP_MAX_ATTEMPTS", 2)?,

            lookup_min_similarity: parse_var("LOOKUP_MIN_SIMILARITY", 0.85)?,

            bluray_base_url: env::var("BLURAY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),

            bluray_country: env::var("BLURAY_COUNTRY").unwrap_or_else(|_| "US".to_string()),

            settings_file: env::var("AUTOFIT_SETTINGS_FILE").ok().map(PathBuf::from),
        })
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_attempts: self.metadata_max_attempts,
            retry_interval: self.metadata_retry_interval,
            placeholders: DEFAULT_PLACEHOLDERS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            base_url: self.bluray_base_url.clone(),
            country: self.bluray_country.clone(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: self.lookup_request_timeout,
            lookup_timeout: self.lookup_timeout,
            retry: RetryConfig {
                max_attempts: self.lookup_max_attempts,
                ..RetryConfig::default()
            },
            min_title_similarity: self.lookup_min_similarity.clamp(0.0, 1.0),
        }
    }

    pub fn settings(&self) -> EnvSettings {
        EnvSettings::new(self.settings_file.clone())
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        _ => Ok(default),
    }
}
