//! Configuration management for the passive-mode FTP server
//!
//! One `ServerConfig` value is built at startup from built-in defaults,
//! an optional `config.toml` and `PASV_FTP_*` environment overrides. The
//! server owns it and hands it to every session behind an `Arc`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    // ═══ NETWORK ═══
    /// Address for the control listener and every passive data listener.
    /// Also the host advertised in PASV replies.
    pub bind_address: String,

    /// Port for the control connection
    pub control_port: u16,

    /// Inclusive port range for PASV data channels
    pub data_port_min: u16,
    pub data_port_max: u16,

    // ═══ FILESYSTEM ═══
    /// Server root; every file operation is joined against it
    pub server_root: PathBuf,

    // ═══ CREDENTIALS ═══
    pub username: String,
    pub password: String,

    /// Reject everything but USER, PASS, QUIT and NOOP until login succeeds
    pub require_auth: bool,

    // ═══ INTERNAL BEHAVIOR ═══
    /// Payload of the SUCCESS line sent when a client connects
    pub greeting: String,

    /// Read buffer for data channels
    pub buffer_size: usize,

    /// How long a passive listener waits for the client to connect
    pub data_connect_timeout_secs: u64,

    /// Grace period for in-flight upload bytes once FNRC arrives
    pub upload_drain_timeout_ms: u64,

    /// Maximum control line length
    pub max_command_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            control_port: 8800,
            data_port_min: 8801,
            data_port_max: 8810,
            server_root: PathBuf::from("public_ftp"),
            username: "TEST".to_string(),
            password: "TEST".to_string(),
            require_auth: false,
            greeting: "pasv-ftp-server ready".to_string(),
            buffer_size: 8192,
            data_connect_timeout_secs: 10,
            upload_drain_timeout_ms: 500,
            max_command_length: 512,
        }
    }
}

impl ServerConfig {
    /// Load configuration: defaults, then `config.toml` if present, then
    /// `PASV_FTP_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Same as [`ServerConfig::load`] with an explicit config file stem.
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = Config::builder()
            .set_default("bind_address", defaults.bind_address.as_str())?
            .set_default("control_port", i64::from(defaults.control_port))?
            .set_default("data_port_min", i64::from(defaults.data_port_min))?
            .set_default("data_port_max", i64::from(defaults.data_port_max))?
            .set_default("server_root", defaults.server_root.to_string_lossy().as_ref())?
            .set_default("username", defaults.username.as_str())?
            .set_default("password", defaults.password.as_str())?
            .set_default("require_auth", defaults.require_auth)?
            .set_default("greeting", defaults.greeting.as_str())?
            .set_default("buffer_size", defaults.buffer_size as i64)?
            .set_default(
                "data_connect_timeout_secs",
                defaults.data_connect_timeout_secs as i64,
            )?
            .set_default(
                "upload_drain_timeout_ms",
                defaults.upload_drain_timeout_ms as i64,
            )?
            .set_default("max_command_length", defaults.max_command_length as i64)?
            .add_source(File::with_name(config_path).required(false))
            .add_source(Environment::with_prefix("PASV_FTP").try_parsing(true))
            .build()?;

        let mut config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        config.server_root = absolute_root(&config.server_root)?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_port == 0 {
            return Err(ConfigError::Message("control_port cannot be 0".into()));
        }

        if self.data_port_min == 0 || self.data_port_max == 0 {
            return Err(ConfigError::Message(
                "data port range cannot include port 0".into(),
            ));
        }

        if self.data_port_min > self.data_port_max {
            return Err(ConfigError::Message(
                "data_port_min must not exceed data_port_max".into(),
            ));
        }

        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Message("bind_address cannot be empty".into()));
        }

        if self.server_root.as_os_str().is_empty() {
            return Err(ConfigError::Message("server_root cannot be empty".into()));
        }

        if self.username.is_empty() {
            return Err(ConfigError::Message("username cannot be empty".into()));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        if self.data_connect_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "data_connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.upload_drain_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "upload_drain_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.max_command_length == 0 {
            return Err(ConfigError::Message(
                "max_command_length must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Control listener address as `host:port`
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Passive data port range
    pub fn data_port_range(&self) -> RangeInclusive<u16> {
        self.data_port_min..=self.data_port_max
    }

    pub fn server_root_str(&self) -> String {
        self.server_root.to_string_lossy().to_string()
    }

    pub fn data_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connect_timeout_secs)
    }

    pub fn upload_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_drain_timeout_ms)
    }
}

fn absolute_root(root: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(root).map_err(|e| {
        ConfigError::Message(format!(
            "cannot resolve server_root {}: {}",
            root.display(),
            e
        ))
    })
}
