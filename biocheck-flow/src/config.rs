use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use log::{debug, warn};

use crate::error::{ErrorCode, FlowError};

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://tokens.enext.ltd/token";
pub const DEFAULT_VALIDATION_ENDPOINT: &str = "https://biometrico.enext.ltd/validarbiometria";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: EndpointSettings,
    #[serde(default)]
    pub flow: FlowSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub version: u32,
}

/// Defaults merged into a start request that leaves these out.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(default = "default_token_endpoint")]
    pub token: String,
    #[serde(default = "default_validation_endpoint")]
    pub validation: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_countdown_ms")]
    pub countdown_ms: u64,
    #[serde(default = "default_notice_ms")]
    pub notice_ms: u64,
    #[serde(default = "default_camera_warmup_ms")]
    pub camera_warmup_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default)]
    pub device_index: Option<i32>,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_token_endpoint() -> String { DEFAULT_TOKEN_ENDPOINT.to_string() }
fn default_validation_endpoint() -> String { DEFAULT_VALIDATION_ENDPOINT.to_string() }
fn default_max_attempts() -> u32 { 3 }
fn default_countdown_ms() -> u64 { 3000 }
fn default_notice_ms() -> u64 { 4000 }
fn default_camera_warmup_ms() -> u64 { 500 }
fn default_timeout_secs() -> u64 { 30 }
fn default_frame_width() -> u32 { 1280 }
fn default_frame_height() -> u32 { 720 }
fn default_jpeg_quality() -> u8 { 85 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: EndpointSettings::default(),
            flow: FlowSettings::default(),
            http: HttpSettings::default(),
            camera: CameraSettings::default(),
            version: 1,
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            token: default_token_endpoint(),
            validation: default_validation_endpoint(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSettings")
            .field("token", &self.token)
            .field("validation", &self.validation)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            countdown_ms: default_countdown_ms(),
            notice_ms: default_notice_ms(),
            camera_warmup_ms: default_camera_warmup_ms(),
        }
    }
}

impl FlowSettings {
    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    pub fn notice(&self) -> Duration {
        Duration::from_millis(self.notice_ms)
    }

    pub fn camera_warmup(&self) -> Duration {
        Duration::from_millis(self.camera_warmup_ms)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: default_timeout_secs() }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: None,
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let settings: Settings = serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", path.display()))?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// User config first, then the system-wide one, then built-in defaults.
    pub fn load_default() -> Self {
        for path in Self::search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", path);
                    return settings;
                }
                Err(e) => warn!("Ignoring settings file {:?}: {:#}", path, e),
            }
        }
        Self::default()
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("biocheck").join("config.json"));
        }
        paths.push(PathBuf::from("/etc/biocheck/config.json"));
        paths
    }
}

/// Everything one flow needs, fixed at start.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub subject_id: String,
    pub secondary_id: String,
    pub token_endpoint: String,
    pub validation_endpoint: String,
    pub username: String,
    pub password: String,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), FlowError> {
        let fields = [
            ("subjectId", &self.subject_id),
            ("secondaryId", &self.secondary_id),
            ("tokenEndpoint", &self.token_endpoint),
            ("validationEndpoint", &self.validation_endpoint),
            ("username", &self.username),
            ("password", &self.password),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(FlowError::new(
                    ErrorCode::ConfigError,
                    format!("Missing required field: {}", name),
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("subject_id", &self.subject_id)
            .field("secondary_id", &self.secondary_id)
            .field("token_endpoint", &self.token_endpoint)
            .field("validation_endpoint", &self.validation_endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
