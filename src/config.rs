//! Server configuration
//!
//! Every field has a default, so an empty or missing config file is valid.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:9090";

/// Environment variable naming an optional TOML config file
pub const CONFIG_ENV: &str = "CHATROOM_CONFIG";

/// Smallest outbound queue that holds a full handshake burst
/// (OK, admin notice, welcome, join) with room to spare
pub const MIN_CLIENT_BUFFER: usize = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub bind_addr: String,
    /// Capacity of the session → server command channel
    pub command_buffer: usize,
    /// Capacity of each connection's outbound queue; a peer that lets
    /// it fill up is dropped
    pub client_buffer: usize,
    /// Longest accepted line in bytes, terminator excluded
    pub max_line_length: usize,
    /// How long a closing session waits for queued output to flush
    pub drain_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            command_buffer: 256,
            client_buffer: 128,
            max_line_length: 4096,
            drain_timeout_ms: 1000,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.client_buffer < MIN_CLIENT_BUFFER {
            return Err(AppError::InvalidConfig(format!(
                "client_buffer must be at least {}, got {}",
                MIN_CLIENT_BUFFER, self.client_buffer
            )));
        }
        if self.command_buffer == 0 {
            return Err(AppError::InvalidConfig("command_buffer must be positive".into()));
        }
        if self.max_line_length == 0 {
            return Err(AppError::InvalidConfig("max_line_length must be positive".into()));
        }
        Ok(())
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from `CHATROOM_CONFIG` if set, defaults otherwise
    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.bind_addr, DEFAULT_ADDR);
        assert_eq!(config.client_buffer, 128);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml("bind_addr = \"0.0.0.0:7000\"\nmax_line_length = 512\n").unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.max_line_length, 512);
        assert_eq!(config.drain_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_small_client_buffer_rejected() {
        assert!(matches!(
            Config::from_toml("client_buffer = 1"),
            Err(AppError::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_toml("client_buffer = 3"),
            Err(AppError::InvalidConfig(_))
        ));
        let config = Config::from_toml("client_buffer = 8").unwrap();
        assert_eq!(config.client_buffer, MIN_CLIENT_BUFFER);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(Config::from_toml("command_buffer = 0").is_err());
        assert!(Config::from_toml("max_line_length = 0").is_err());
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(
            Config::from_toml("client_buffer = \"lots\""),
            Err(AppError::Config(_))
        ));
    }
}
