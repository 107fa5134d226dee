use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::types::CaptureMetadata;

/// Port the streaming sink pushes pose datagrams from
pub const DEFAULT_SEND_PORT: u16 = 7300;

/// Port the streaming sink listens on for peer discovery
pub const DEFAULT_LISTEN_PORT: u16 = 7299;

/// Which data streams a recording captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Write `m` and `c` lines
    #[serde(default = "default_true")]
    pub camera: bool,
    /// Write `d` lines after each point cloud change
    #[serde(default = "default_true")]
    pub point_cloud: bool,
    /// Write `p`, `b` and `pd` lines
    #[serde(default = "default_true")]
    pub planes: bool,
    /// Append the confidence field to `d` lines
    #[serde(default = "default_true")]
    pub confidence: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            camera: true,
            point_cloud: true,
            planes: true,
            confidence: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Network endpoints of the live pose feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Local address both sockets bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Outbound pose port
    #[serde(default = "default_send_port")]
    pub send_port: u16,
    /// Inbound discovery port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

impl StreamConfig {
    pub fn send_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.send_port)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.listen_port)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            send_port: DEFAULT_SEND_PORT,
            listen_port: DEFAULT_LISTEN_PORT,
        }
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_send_port() -> u16 {
    DEFAULT_SEND_PORT
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Directory new recordings are created in
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub record: RecordConfig,
    /// Camera intrinsics for the `m` line; omitted when unknown
    #[serde(default)]
    pub metadata: Option<CaptureMetadata>,
    #[serde(default)]
    pub stream: StreamConfig,
}

fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".arcapture").join("recordings"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            record: RecordConfig::default(),
            metadata: None,
            stream: StreamConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("Config file not found, using defaults: {}", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Parse and validate configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream = &self.stream;
        if stream.send_port != 0 && stream.send_port == stream.listen_port {
            return Err(ConfigError::ValidationError(format!(
                "send_port and listen_port must differ (both {})",
                stream.send_port
            )));
        }
        if let Some(meta) = &self.metadata {
            if !(meta.fov.is_finite() && meta.fov > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "metadata.fov must be positive, got {}",
                    meta.fov
                )));
            }
            if meta.width == 0 || meta.height == 0 {
                return Err(ConfigError::ValidationError(
                    "metadata width and height must be non-zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
