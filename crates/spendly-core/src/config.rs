//! Runtime configuration
//!
//! Resolution order:
//! 1. Explicit path (`--config` / `SPENDLY_CONFIG`), which must exist
//! 2. Override file in the data dir (~/.local/share/spendly/config.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Environment variables are applied last and win over any file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::LocalCalendar;
use crate::error::{Error, Result};
use crate::rate_limit::RateLimitConfig;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/spendly.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http_timeout_secs: u64,
    /// Local image store directory when Cloudinary is not configured
    pub image_dir: Option<PathBuf>,
    pub rate_limit: RateLimitSettings,
    pub bot: BotSettings,
    pub dashboard: DashboardSettings,
    pub twilio: TwilioSettings,
    pub cloudinary: CloudinarySettings,
    pub vision: VisionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            image_dir: None,
            rate_limit: RateLimitSettings::default(),
            bot: BotSettings::default(),
            dashboard: DashboardSettings::default(),
            twilio: TwilioSettings::default(),
            cloudinary: CloudinarySettings::default(),
            vision: VisionSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_messages: u32,
    pub window_hours: i64,
    pub warn_remaining: u32,
    pub sweep_interval_minutes: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            window_hours: 24,
            warn_remaining: 3,
            sweep_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub timezone_offset_minutes: i32,
    pub dashboard_tip_probability: f64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            timezone_offset_minutes: 0,
            dashboard_tip_probability: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub frontend_url: String,
    pub jwt_secret: Option<String>,
    pub link_ttl_minutes: i64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3001".to_string(),
            jwt_secret: None,
            link_ttl_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudinarySettings {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub folder: String,
}

impl Default for CloudinarySettings {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: "whatsapp-expenses".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSettings {
    pub api_key: Option<String>,
}

impl Config {
    /// Load config from files and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_files(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn from_files(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::read(path);
        }

        match default_config_path() {
            Some(default_path) if default_path.exists() => Self::read(&default_path),
            _ => Self::from_toml(DEFAULT_CONFIG),
        }
    }

    fn read(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading config");
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FRONTEND_URL") {
            self.dashboard.frontend_url = v;
        }
        if let Some(v) = get("JWT_SECRET") {
            self.dashboard.jwt_secret = Some(v);
        }
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = Some(v);
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = Some(v);
        }
        if let Some(v) = get("TWILIO_WHATSAPP_NUMBER") {
            self.twilio.from_number = Some(v);
        }
        if let Some(v) = get("CLOUDINARY_CLOUD_NAME") {
            self.cloudinary.cloud_name = Some(v);
        }
        if let Some(v) = get("CLOUDINARY_API_KEY") {
            self.cloudinary.api_key = Some(v);
        }
        if let Some(v) = get("CLOUDINARY_API_SECRET") {
            self.cloudinary.api_secret = Some(v);
        }
        if let Some(v) = get("CLOUDINARY_FOLDER") {
            self.cloudinary.folder = v;
        }
        if let Some(v) = get("SPENDLY_IMAGE_DIR") {
            self.image_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("GOOGLE_VISION_API_KEY") {
            self.vision.api_key = Some(v);
        }
        if let Some(minutes) = get("SPENDLY_TIMEZONE_OFFSET_MINUTES").and_then(|v| v.parse().ok())
        {
            self.bot.timezone_offset_minutes = minutes;
        }
        if let Some(limit) = get("SPENDLY_RATE_LIMIT").and_then(|v| v.parse().ok()) {
            self.rate_limit.max_messages = limit;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn calendar(&self) -> LocalCalendar {
        LocalCalendar::from_offset_minutes(self.bot.timezone_offset_minutes)
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_messages: self.rate_limit.max_messages,
            window: chrono::Duration::hours(self.rate_limit.window_hours.max(1)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.sweep_interval_minutes.max(1) * 60)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("config.toml"))
}

/// Spendly's directory under the platform data dir
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendly"))
}
