//! Configuration management for Blastline
//!
//! Defaults, a TOML file, and `BLASTLINE_<SECTION>_<KEY>` environment
//! overrides, all validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogLevel;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,

    /// Grace period for in-flight requests once a shutdown signal arrives
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Origins allowed by the CORS layer (the desktop companion app)
    pub cors_origins: Vec<String>,

    /// Directory served under `/assets`, if any
    pub assets_dir: Option<PathBuf>,
}

/// Protocol session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the protocol client keeps its device record
    pub device_store: PathBuf,

    /// Capacity of the pairing event channel
    pub pairing_buffer: usize,

    /// Capacity of the protocol event broadcast channel
    pub event_buffer: usize,
}

/// Bulk dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay after every send attempt, success or failure
    #[serde(with = "humantime_serde")]
    pub pacing_delay: Duration,

    /// Server part appended to bare recipient numbers
    pub recipient_domain: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub json_format: bool,
    pub with_target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            shutdown_timeout: Duration::from_secs(5),
            cors_origins: vec!["http://localhost:1212".to_string()],
            assets_dir: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_store: PathBuf::from("./device.json"),
            pairing_buffer: 8,
            event_buffer: 256,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_delay: Duration::from_secs(2),
            recipient_domain: "s.whatsapp.net".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_target: true }
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    raw.parse().map_err(|e| ConfigError::invalid(key, e))
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| ConfigError::invalid(key, e))
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    ///
    /// Example: `BLASTLINE_SERVER_BIND_ADDRESS=127.0.0.1:9000`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let mut config: Self = toml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(addr) = env::var("BLASTLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address =
                addr.parse().map_err(|e| ConfigError::invalid("server.bind_address", e))?;
        }
        if let Ok(timeout) = env::var("BLASTLINE_SERVER_SHUTDOWN_TIMEOUT") {
            self.server.shutdown_timeout = parse_duration("server.shutdown_timeout", &timeout)?;
        }
        if let Ok(origins) = env::var("BLASTLINE_SERVER_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(dir) = env::var("BLASTLINE_SERVER_ASSETS_DIR") {
            self.server.assets_dir = Some(PathBuf::from(dir));
        }

        // Session
        if let Ok(path) = env::var("BLASTLINE_SESSION_DEVICE_STORE") {
            self.session.device_store = PathBuf::from(path);
        }

        // Dispatch
        if let Ok(delay) = env::var("BLASTLINE_DISPATCH_PACING_DELAY") {
            self.dispatch.pacing_delay = parse_duration("dispatch.pacing_delay", &delay)?;
        }
        if let Ok(domain) = env::var("BLASTLINE_DISPATCH_RECIPIENT_DOMAIN") {
            self.dispatch.recipient_domain = domain;
        }

        // Logging
        if let Ok(level) = env::var("BLASTLINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = env::var("BLASTLINE_LOG_JSON") {
            self.logging.json_format = parse_flag("logging.json_format", &json)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.pairing_buffer == 0 {
            return Err(ConfigError::invalid("session.pairing_buffer", "must be greater than 0"));
        }
        if self.session.event_buffer == 0 {
            return Err(ConfigError::invalid("session.event_buffer", "must be greater than 0"));
        }

        let domain = self.dispatch.recipient_domain.trim();
        if domain.is_empty() || domain.contains('@') {
            return Err(ConfigError::invalid(
                "dispatch.recipient_domain",
                format!("'{}' is not a bare domain", self.dispatch.recipient_domain),
            ));
        }

        self.logging
            .level
            .parse::<LogLevel>()
            .map_err(|e| ConfigError::invalid("logging.level", e))?;

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }
}
