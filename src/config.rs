//! Service configuration.
//!
//! Layered: compiled-in defaults, then an optional TOML file, then
//! environment variables. CLI flags are applied last by `main`.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::simulator::LatencyProfile;
use crate::analysis::upload::MAX_UPLOAD_BYTES;
use crate::analysis::{ProviderKind, UnknownIdPolicy};
use crate::capture::FacingMode;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub webcam: WebcamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.webcam.interval_ms == 0 {
            bail!("webcam.interval_ms must be greater than zero");
        }
        if self.webcam.history == 0 {
            bail!("webcam.history must be at least 1");
        }
        if self.analysis.poll_max_attempts == 0 {
            bail!("analysis.poll_max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Resolve the configuration for this process:
    /// 1. `path` if given, else the file named by `SATYA_CONFIG`, else defaults.
    /// 2. Environment variable overrides on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => match std::env::var("SATYA_CONFIG") {
                Ok(env_path) => Self::load(Path::new(&env_path))?,
                Err(_) => {
                    debug!("no config file given, using compiled-in defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Taking the lookup as a
    /// closure keeps this testable without touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(value = %port, "ignoring invalid PORT"),
            }
        }
        if let Some(env) = lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
            self.server.environment = Environment::parse_lenient(&env);
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(url) = lookup("API_URL").or_else(|| lookup("NEXT_PUBLIC_API_URL")) {
            if !url.is_empty() {
                self.analysis.api_url = Some(url);
            }
        }
        if let Some(provider) = lookup("SATYA_PROVIDER") {
            match provider.parse() {
                Ok(kind) => self.analysis.provider = kind,
                Err(e) => warn!(error = %e, "ignoring SATYA_PROVIDER"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Unknown values fall back to development.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    /// Allowed CORS origin; `*` allows any.
    pub cors_origin: String,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: Environment::Development,
            cors_origin: "http://localhost:3000".to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider: ProviderKind,
    /// Base URL of the remote API (remote provider only).
    pub api_url: Option<String>,
    pub unknown_id_policy: UnknownIdPolicy,
    pub latency: LatencyProfile,
    pub request_timeout_secs: u64,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Simulated,
            api_url: None,
            unknown_id_policy: UnknownIdPolicy::Fabricate,
            latency: LatencyProfile::default(),
            request_timeout_secs: 30,
            poll_max_attempts: 10,
            poll_interval_ms: 1000,
        }
    }
}

impl AnalysisConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Webcam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebcamConfig {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
    /// Time between capture attempts while analyzing.
    pub interval_ms: u64,
    /// Number of recent frames kept for display.
    pub history: usize,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            facing_mode: FacingMode::User,
            interval_ms: 1000,
            history: 5,
        }
    }
}

impl WebcamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
