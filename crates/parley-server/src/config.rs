//! Server Configuration
//!
//! Configuration types and defaults for the relay server.

use parley_protocol::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT, MIN_FRAME_SIZE,
    READ_TIMEOUT, SERVER_POLL_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind_address: String,

    /// Service port for TCP and UDP discovery (0 lets the OS pick)
    pub port: u16,

    /// Answer discovery probes
    pub enable_discovery: bool,

    /// Replay history capacity in bytes
    pub history_capacity: usize,

    /// Largest accepted frame length field
    pub max_frame_size: usize,

    /// Readiness wait tick in milliseconds
    pub poll_interval_ms: u64,

    /// Time allowed to finish a frame once started, in milliseconds
    pub read_timeout_ms: u64,

    /// Time allowed for one relay send to one client, in milliseconds
    pub send_timeout_ms: u64,

    /// Time allowed to deliver the identity and history to a new client
    pub handshake_timeout_ms: u64,

    /// Log level
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            enable_discovery: true,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            poll_interval_ms: SERVER_POLL_INTERVAL.as_millis() as u64,
            read_timeout_ms: READ_TIMEOUT.as_millis() as u64,
            send_timeout_ms: 2_000,
            handshake_timeout_ms: 5_000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Get the bind socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            ConfigError::InvalidValue(format!("bind_address {:?} is not an IP address", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.max_frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "max_frame_size must be at least {}",
                MIN_FRAME_SIZE
            )));
        }

        if self.max_frame_size > u32::MAX as usize {
            return Err(ConfigError::InvalidValue(
                "max_frame_size must fit in 32 bits".into(),
            ));
        }

        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{} cannot be 0", name)));
            }
        }

        Ok(())
    }
}

/// Configuration builder
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    /// Set service port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Enable/disable discovery replies
    pub fn discovery(mut self, enabled: bool) -> Self {
        self.config.enable_discovery = enabled;
        self
    }

    /// Set history capacity in bytes
    pub fn history_capacity(mut self, bytes: usize) -> Self {
        self.config.history_capacity = bytes;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set readiness tick
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set mid-frame read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set per-client relay send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set new-client handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
