//! # Configuration Management
//!
//! Loads the host-level settings for the voice session service from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! Session behaviour (model, voice persona, instruction, sample rates, block
//! size) is fixed in code and deliberately absent here.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST`, `PORT` and `GEMINI_API_KEY` environment variables
//! 2. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Multi-word Keys:
//! The APP_ source splits on `_`, so keys such as `transport.api_key` or
//! `device.input_path` are set in config.toml or through the dedicated
//! overrides above.

use crate::transport::live::DEFAULT_ENDPOINT;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub device: DeviceConfig,
}

/// Control surface bind address.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Streaming-session provider connection.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the live conversation service (`ws://` or `wss://`)
/// - `api_key`: Credential appended to the endpoint; empty means "not configured"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub endpoint: String,
    pub api_key: String,
}

/// Files backing the headless audio engine.
///
/// ## Fields:
/// - `input_path`: 16kHz mono 16-bit WAV replayed as the microphone
/// - `output_path`: Where response audio is written when a session ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub input_path: String,
    pub output_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            transport: TransportConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                api_key: String::new(), // Must be supplied; never shipped in defaults
            },
            device: DeviceConfig {
                input_path: "input.wav".to_string(),
                output_path: "output.wav".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `HOST=0.0.0.0` / `PORT=3000`: Deployment platform conventions
    /// - `GEMINI_API_KEY=...`: Provider credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            settings = settings.set_override("transport.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is not a validation error: the service still starts,
    /// and each `start` fails with a configuration error until one is provided.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let endpoint = self.transport.endpoint.trim();
        if endpoint.is_empty() {
            return Err(anyhow::anyhow!("Transport endpoint cannot be empty"));
        }
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(anyhow::anyhow!(
                "Transport endpoint must be a ws:// or wss:// URL, got {}",
                endpoint
            ));
        }

        if self.device.input_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Device input path cannot be empty"));
        }

        if self.device.output_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Device output path cannot be empty"));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.transport.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.transport.endpoint, DEFAULT_ENDPOINT);
        assert!(!config.has_api_key());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transport.endpoint = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transport.endpoint = "https://example.com/live".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.device.output_path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_survive_config_round_trip() {
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .add_source(config::File::from_str(
                "[server]\nport = 9090\n[transport]\napi_key = \"secret\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = built.try_deserialize().unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.has_api_key());
        assert_eq!(config.device.input_path, "input.wav");
    }
}
