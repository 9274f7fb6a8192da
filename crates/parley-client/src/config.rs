//! Client Configuration
//!
//! Configuration types and defaults for the chat client.

use crate::errors::ClientError;
use parley_crypto::SecretKey;
use parley_protocol::{
    validate_name, CLIENT_POLL_INTERVAL, DEFAULT_GROUP, DEFAULT_HOST, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_PORT, DISCOVERY_ATTEMPTS, DISCOVERY_TIMEOUT, READ_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host, used directly or as the discovery fallback
    pub server_host: String,

    /// Server port
    pub port: u16,

    /// Display name
    pub name: String,

    /// Conversation group
    pub group: String,

    /// Send the group and only show messages from it
    pub use_group: bool,

    /// Look for a server with a UDP broadcast first
    pub enable_discovery: bool,

    /// Discovery broadcasts before falling back to `server_host`
    pub discovery_attempts: u32,

    /// Wait per discovery broadcast in milliseconds
    pub discovery_timeout_ms: u64,

    /// Shared passphrase; enables encryption when set
    pub passphrase: Option<String>,

    /// Send a typing notification per keystroke
    pub send_typing: bool,

    /// Announce joining and leaving
    pub send_presence: bool,

    /// Treat input and output as UTF-8
    pub utf8: bool,

    /// Wrap long lines anywhere instead of at word boundaries
    pub ignore_break: bool,

    /// Readiness wait tick in milliseconds
    pub poll_interval_ms: u64,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Time allowed to receive the identity, and to finish a started frame
    pub read_timeout_ms: u64,

    /// Largest accepted frame length field
    pub max_frame_size: usize,
}

/// Login name of the current user, or a placeholder
pub fn default_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|name| validate_name("name", name).is_ok())
        .unwrap_or_else(|| "anonymous".to_string())
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            name: default_name(),
            group: DEFAULT_GROUP.to_string(),
            use_group: true,
            enable_discovery: false,
            discovery_attempts: DISCOVERY_ATTEMPTS,
            discovery_timeout_ms: DISCOVERY_TIMEOUT.as_millis() as u64,
            passphrase: None,
            send_typing: false,
            send_presence: true,
            utf8: true,
            ignore_break: false,
            poll_interval_ms: CLIENT_POLL_INTERVAL.as_millis() as u64,
            connect_timeout_ms: 5_000,
            read_timeout_ms: READ_TIMEOUT.as_millis() as u64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ClientError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the static server address
    pub fn resolve_server_address(&self) -> Result<SocketAddr, ClientError> {
        (self.server_host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::DnsResolutionFailed {
                host: self.server_host.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| ClientError::InvalidAddress(self.server_host.clone()))
    }

    /// Group sent with every frame, if groups are on
    pub fn frame_group(&self) -> Option<&str> {
        self.use_group.then_some(self.group.as_str())
    }

    /// Message key derived from the passphrase
    pub fn secret_key(&self) -> Option<SecretKey> {
        self.passphrase.as_deref().map(SecretKey::from_passphrase)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ClientError> {
        validate_name("name", &self.name).map_err(|e| ClientError::Config(e.to_string()))?;

        if self.use_group {
            validate_name("group", &self.group).map_err(|e| ClientError::Config(e.to_string()))?;
        }

        if self.port == 0 {
            return Err(ClientError::Config("port cannot be 0".into()));
        }

        if matches!(&self.passphrase, Some(p) if p.is_empty()) {
            return Err(ClientError::Config("passphrase cannot be empty".into()));
        }

        if self.enable_discovery && self.discovery_attempts == 0 {
            return Err(ClientError::Config(
                "discovery_attempts cannot be 0 with discovery on".into(),
            ));
        }

        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(ClientError::Config(format!("{} cannot be 0", name)));
            }
        }

        Ok(())
    }
}

/// Configuration builder
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set server host
    pub fn server_host(mut self, host: impl Into<String>) -> Self {
        self.config.server_host = host.into();
        self
    }

    /// Set server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set group
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.config.group = group.into();
        self
    }

    /// Enable/disable groups
    pub fn use_group(mut self, enabled: bool) -> Self {
        self.config.use_group = enabled;
        self
    }

    /// Enable/disable discovery
    pub fn discovery(mut self, enabled: bool) -> Self {
        self.config.enable_discovery = enabled;
        self
    }

    /// Set discovery attempts and per-attempt wait
    pub fn discovery_retries(mut self, attempts: u32, wait: Duration) -> Self {
        self.config.discovery_attempts = attempts;
        self.config.discovery_timeout_ms = wait.as_millis() as u64;
        self
    }

    /// Set passphrase (enables encryption)
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.config.passphrase = Some(passphrase.into());
        self
    }

    /// Enable/disable typing notifications
    pub fn send_typing(mut self, enabled: bool) -> Self {
        self.config.send_typing = enabled;
        self
    }

    /// Enable/disable enter/exit announcements
    pub fn send_presence(mut self, enabled: bool) -> Self {
        self.config.send_presence = enabled;
        self
    }

    /// Enable/disable UTF-8 handling
    pub fn utf8(mut self, enabled: bool) -> Self {
        self.config.utf8 = enabled;
        self
    }

    /// Enable/disable word-boundary wrapping
    pub fn ignore_break(mut self, enabled: bool) -> Self {
        self.config.ignore_break = enabled;
        self
    }

    /// Set readiness tick
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set identity / frame read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.port, 24242);
        assert_eq!(config.group, "default");
        assert!(config.use_group);
        assert!(!config.send_typing);
        assert!(config.send_presence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .server_host("localhost")
            .port(4000)
            .name("alice")
            .group("ops")
            .passphrase("hunter2")
            .send_typing(true)
            .build()
            .unwrap();

        assert_eq!(config.name, "alice");
        assert_eq!(config.frame_group(), Some("ops"));
        assert_eq!(config.secret_key(), Some(SecretKey::from_passphrase("hunter2")));
        assert!(config.send_typing);
    }

    #[test]
    fn test_no_group() {
        let config = ClientConfig::builder()
            .name("bob")
            .use_group(false)
            .group("ignored|bad")
            .build()
            .unwrap();
        assert_eq!(config.frame_group(), None);
    }

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::builder().name("a@b").build().is_err());
        assert!(ClientConfig::builder().name("ok").group("x|y").build().is_err());
        assert!(ClientConfig::builder().name("ok").port(0).build().is_err());
        assert!(ClientConfig::builder().name("ok").passphrase("").build().is_err());
        assert!(ClientConfig::builder()
            .name("ok")
            .discovery(true)
            .discovery_retries(0, Duration::from_secs(1))
            .build()
            .is_err());
    }

    #[test]
    fn test_resolve_address() {
        let config = ClientConfig::builder().name("a").port(5555).build().unwrap();
        let addr = config.resolve_server_address().unwrap();
        assert_eq!(addr, "127.0.0.1:5555".parse().unwrap());
    }

    #[test]
    fn test_default_name_is_valid() {
        assert!(validate_name("name", &default_name()).is_ok());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ClientConfig::builder()
            .name("carol")
            .passphrase("pw")
            .build()
            .unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.name, "carol");
        assert_eq!(parsed.passphrase.as_deref(), Some("pw"));

        let partial: ClientConfig = toml::from_str("name = \"dave\"").unwrap();
        assert_eq!(partial.port, DEFAULT_PORT);
        assert!(partial.passphrase.is_none());
    }
}
