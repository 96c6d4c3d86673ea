//! Configuration management with environment variable support and validation.

use anyhow::{anyhow, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    /// Service name stamped on exported spans
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            service_name: "agent_orchestrator".to_string(),
            otlp_endpoint: None,
        }
    }
}

/// Executor defaults used by the CLI when a plan file does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub max_retries: u32,
    pub parallel: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            parallel: false,
        }
    }
}

/// Outbound HTTP adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub requests_per_second: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            requests_per_second: 10,
        }
    }
}

/// Main settings structure with all configuration sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Settings {
    /// Load settings from the embedded defaults, an optional local
    /// `config.toml`, and `ORCH__`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("ORCH")
                    .separator("__")
                    .list_separator(",")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_seconds == 0 {
            return Err(anyhow!("HTTP timeout cannot be 0"));
        }
        if self.http.requests_per_second == 0 {
            return Err(anyhow!("HTTP rate limit cannot be 0"));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(anyhow!(
                "Unknown logging format '{}' (expected 'text' or 'json')",
                self.logging.format
            ));
        }
        if self.logging.service_name.is_empty() {
            return Err(anyhow!("Logging service name cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut settings = Settings::default();
        settings.http.timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut settings = Settings::default();
        settings.logging.format = "yaml".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_service_name_is_rejected() {
        let mut settings = Settings::default();
        settings.logging.service_name.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn embedded_defaults_parse() {
        let config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.http.timeout_seconds, 30);
    }
}
