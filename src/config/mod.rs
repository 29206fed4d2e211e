//! Configuration module for the tuning server
//!
//! The server is configured from a single TOML file whose sections map onto
//! the components that consume them:
//!
//! - `[tuning]` - TCP control port, session limit, poll interval
//! - `[stream]` / `[rtsp]` - endpoints advertised through discovery
//! - `[discovery]` - UDP responder
//! - `[pipeline]` - which camera pipeline backend to drive
//! - `[logging]` - tracing filter and optional rolling log directory
//!
//! Every section is optional; missing keys take the defaults below.
//!
//! # Example
//!
//! ```ignore
//! use stf_tuning_server::config::ServerConfig;
//!
//! let config = ServerConfig::load("tuning.toml")?;
//! assert_eq!(config.tuning.port, 8550);
//! ```

use crate::error::{Result, TuningError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default TCP port for the tuning control protocol
pub const DEFAULT_TUNING_PORT: u16 = 8550;

/// Default UDP port for discovery requests
pub const DEFAULT_DISCOVERY_PORT: u16 = 8551;

/// Default advertised stream port
pub const DEFAULT_STREAM_PORT: u16 = 8552;

/// Default advertised RTSP port
pub const DEFAULT_RTSP_PORT: u16 = 8554;

/// Default number of concurrent tuning sessions
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Default accept/read poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default discovery read timeout in milliseconds
pub const DEFAULT_DISCOVERY_POLL_MS: u64 = 100;

/// Default simulated frame period in milliseconds (~30 fps)
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub tuning: TuningSettings,
    pub stream: StreamSettings,
    pub rtsp: RtspSettings,
    pub discovery: DiscoverySettings,
    pub pipeline: PipelineSettings,
    pub logging: LoggingSettings,
}

/// TCP control protocol settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TuningSettings {
    /// Listening port; 0 picks an ephemeral port
    pub port: u16,
    /// Maximum number of concurrently served clients
    pub max_sessions: usize,
    /// Poll interval for the accept loop and session reads
    pub poll_interval_ms: u64,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_TUNING_PORT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TuningSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Stream endpoint advertised to discovery clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamSettings {
    pub port: u16,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_STREAM_PORT,
        }
    }
}

/// RTSP endpoint advertised to discovery clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RtspSettings {
    pub port: u16,
    /// Stream paths registered as active at startup, e.g. `/live`
    pub streams: Vec<String>,
}

impl Default for RtspSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_RTSP_PORT,
            streams: Vec::new(),
        }
    }
}

/// UDP discovery responder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverySettings {
    pub enabled: bool,
    pub port: u16,
    pub poll_interval_ms: u64,
    /// Host placed in reply URIs. When unset, the local address that
    /// routes to the requester is used.
    pub advertise_host: Option<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_DISCOVERY_PORT,
            poll_interval_ms: DEFAULT_DISCOVERY_POLL_MS,
            advertise_host: None,
        }
    }
}

impl DiscoverySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Camera pipeline backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineBackend {
    /// In-process pipeline model that needs no camera hardware
    #[default]
    Simulated,
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub backend: PipelineBackend,
    pub frame_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            backend: PipelineBackend::Simulated,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }
}

impl PipelineSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Directory for daily rolling log files
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

impl ServerConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TuningError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config = Self::from_toml(&content).map_err(|e| {
            TuningError::Config(format!("Invalid config file {:?}: {}", path, e))
        })?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the given file, or use defaults when no path is supplied
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TuningError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TuningError::Config(e.to_string()))
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tuning.max_sessions == 0 {
            return Err(TuningError::Config(
                "tuning.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.tuning.poll_interval_ms == 0 {
            return Err(TuningError::Config(
                "tuning.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.discovery.poll_interval_ms == 0 {
            return Err(TuningError::Config(
                "discovery.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if let Some(path) = self.rtsp.streams.iter().find(|p| !p.starts_with('/')) {
            return Err(TuningError::Config(format!(
                "rtsp stream path {:?} must start with '/'",
                path
            )));
        }
        Ok(())
    }
}
