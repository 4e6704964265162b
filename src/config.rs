//! Server configuration.
//!
//! A [`Config`] is read from an optional TOML file, then overridden by
//! command line flags, each of which may also be given as a `TCPCHAT_*`
//! environment variable. See [`Cli`].

use crate::{chat::DEFAULT_CHAT_BUFFER, codec::DEFAULT_MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

/// Errors loading a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file is not valid TOML for a [`Config`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Deployment environment. Selects the log format and default level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    /// Local development.
    #[default]
    Local,
    /// Shared development deployment.
    Dev,
    /// Production.
    Prod,
}

/// Full server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Deadline for request/response calls, in milliseconds.
    pub timeout: u64,
    /// Maximum concurrent connections. Unbounded if unset.
    pub max_connections: Option<usize>,
    /// Largest accepted frame, in bytes.
    pub max_frame_len: usize,
    /// Capacity of each chat session's event channel.
    pub chat_buffer: usize,
    /// Deployment environment.
    pub env: Env,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            timeout: 5_000,
            max_connections: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            chat_buffer: DEFAULT_CHAT_BUFFER,
            env: Env::default(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max_frame_len must be positive".into()));
        }
        if self.chat_buffer == 0 {
            return Err(ConfigError::Invalid("chat_buffer must be positive".into()));
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::Invalid("max_connections must be positive".into()));
        }
        Ok(())
    }

    /// The request/response deadline.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// The listener part of the configuration.
    pub const fn server(&self) -> ServerConfig {
        ServerConfig {
            addr: self.addr,
            max_connections: self.max_connections,
            max_frame_len: self.max_frame_len,
        }
    }
}

/// Listener configuration, served with [`Connect`].
///
/// [`Connect`]: crate::Connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Maximum concurrent connections. Unbounded if `None`.
    pub max_connections: Option<usize>,
    /// Largest accepted frame, in bytes.
    pub max_frame_len: usize,
}

/// Command line of the server binary.
#[derive(Debug, Default, clap::Parser)]
#[command(name = "tcpchat", version, about = "Chat server speaking JSON frames over TCP")]
pub struct Cli {
    /// TOML config file.
    #[arg(long, env = "TCPCHAT_CONFIG")]
    pub config: Option<PathBuf>,
    /// Address to listen on.
    #[arg(long, env = "TCPCHAT_ADDR")]
    pub addr: Option<SocketAddr>,
    /// Request/response deadline in milliseconds.
    #[arg(long = "timeout-ms", env = "TCPCHAT_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
    /// Maximum concurrent connections.
    #[arg(long, env = "TCPCHAT_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,
    /// Largest accepted frame in bytes.
    #[arg(long, env = "TCPCHAT_MAX_FRAME_LEN")]
    pub max_frame_len: Option<usize>,
    /// Capacity of each chat session's event channel.
    #[arg(long, env = "TCPCHAT_CHAT_BUFFER")]
    pub chat_buffer: Option<usize>,
    /// Deployment environment.
    #[arg(long, value_enum, env = "TCPCHAT_ENV")]
    pub env: Option<Env>,
}

impl Cli {
    /// Load the config file, if any, apply the overrides, and validate.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(addr) = self.addr {
            config.addr = addr;
        }
        if let Some(timeout) = self.timeout_ms {
            config.timeout = timeout;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = Some(max);
        }
        if let Some(len) = self.max_frame_len {
            config.max_frame_len = len;
        }
        if let Some(buffer) = self.chat_buffer {
            config.chat_buffer = buffer;
        }
        if let Some(env) = self.env {
            config.env = env;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.chat_buffer, 5);
        assert_eq!(config.server().max_frame_len, 64 * 1024);
    }

    #[test]
    fn partial_toml() {
        let config = Config::from_toml(
            r#"
            addr = "0.0.0.0:9000"
            max_connections = 128
            env = "prod"
            "#,
        )
        .unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.max_connections, Some(128));
        assert_eq!(config.env, Env::Prod);
        assert_eq!(config.timeout, 5_000);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_toml("timeout = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("chat_buffer = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("listen = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout = 250\nchat_buffer = 2").unwrap();

        let cli = Cli::try_parse_from([
            "tcpchat",
            "--config",
            file.path().to_str().unwrap(),
            "--chat-buffer",
            "9",
            "--env",
            "dev",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.timeout, 250);
        assert_eq!(config.chat_buffer, 9);
        assert_eq!(config.env, Env::Dev);
    }

    #[test]
    fn missing_file() {
        let cli = Cli {
            config: Some("/nonexistent/tcpchat.toml".into()),
            ..Default::default()
        };
        assert!(matches!(cli.into_config(), Err(ConfigError::Io(_))));
    }
}
