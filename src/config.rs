//! # Configuration Management
//!
//! This module handles loading application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, HOST, PORT)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The model list is the interesting part: each `[[models]]` table names one
//! Whisper variant and the device it should be loaded on. The registry reads
//! this list exactly once at startup; there is no hot-reload.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// One entry per model the registry should try to load at startup.
    pub models: Vec<ModelConfig>,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// One configured model instance: a Whisper variant name plus the device it
/// should be loaded on.
///
/// ## Example (config.toml):
/// ```toml
/// [[models]]
/// name = "base"
/// device = "cpu"
///
/// [[models]]
/// name = "small"
/// device = "cuda"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Whisper model name: tiny, base, small, medium, large
    pub name: String,

    /// Device preference: cpu, cuda, metal, auto (defaults to cpu)
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_device() -> String {
    "cpu".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: vec![ModelConfig {
                name: "base".to_string(),
                device: "cpu".to_string(),
            }],
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong. An empty model list
    /// is rejected here: a transcription service with nothing to serve is a
    /// deployment mistake, not a degraded mode.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.models.is_empty() {
            return Err(anyhow::anyhow!("At least one model must be configured"));
        }

        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Model name cannot be empty"));
            }
        }

        Ok(())
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
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].name, "base");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_config_device_default() {
        // A [[models]] table without a device falls back to cpu.
        let model: ModelConfig = serde_json::from_str(r#"{"name": "base"}"#).unwrap();
        assert_eq!(model.device, "cpu");
    }
}
