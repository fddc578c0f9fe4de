use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "/etc/registry/config.json";

const DEFAULT_DB_PATH: &str = "/var/lib/registry/registry.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub database_path: Option<String>,
    pub max_connections: Option<u32>,
    pub log_filter: Option<String>,
}

impl RegistryConfig {
    /// Loads the config from `REGISTRY_CONFIG_PATH` or the default location.
    ///
    /// # Errors
    ///
    /// This function will return an error if the config file exists but cannot be read or parsed
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REGISTRY_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(&config_path)
    }

    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file exists but its JSON contents cannot be parsed
    pub fn load_from(config_path: &str) -> Result<Self> {
        let path = Path::new(config_path);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {config_path}"))?;

        let config = serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("Failed to parse config JSON: {config_path}"))?;

        Ok(config)
    }

    #[must_use]
    pub fn database_path(&self) -> String {
        self.database_path
            .clone()
            .or_else(|| std::env::var("REGISTRY_DATABASE_PATH").ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
    }

    #[must_use]
    pub fn max_connections(&self) -> u32 {
        self.max_connections
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    #[must_use]
    pub fn log_filter(&self) -> String {
        self.log_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}
