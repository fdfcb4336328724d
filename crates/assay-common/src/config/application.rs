use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::loader::{deserialize_non_empty_string, deserialize_non_zero};
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

const ENV_PREFIX: &str = "ASSAY__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub inventory: InventoryConfig,
    pub crawler: CrawlerConfig,
    pub locations: LocationsConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        Self::figment()
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))
    }

    /// Loads the configuration with an additional TOML file layered between
    /// the built-in defaults and the environment.
    pub fn load_with_file(path: impl AsRef<Path>) -> CommonResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CommonError::invalid(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Toml::file(path))
            .admerge(Self::env())
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))
    }

    fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG)).admerge(Self::env())
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InventoryBackendKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub backend: InventoryBackendKind,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub max_age_secs: u64,
    pub force_refresh: bool,
    pub parallelism: usize,
    pub call_timeout_secs: u64,
    pub max_retries: usize,
    pub retry_backoff_ms: u64,
    pub include_databases: Vec<String>,
}

impl CrawlerConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationsConfig {
    pub min_depth: usize,
    #[serde(deserialize_with = "deserialize_non_zero")]
    pub isolation_threshold: Option<usize>,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            min_depth: 1,
            isolation_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(deserialize_with = "deserialize_non_empty_string")]
    pub log_level: Option<String>,
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config: AppConfig = Figment::from(Toml::string(DEFAULT_CONFIG))
            .extract()
            .unwrap();
        assert_eq!(config.inventory.backend, InventoryBackendKind::File);
        assert_eq!(config.crawler.max_age(), Duration::from_secs(86400));
        assert_eq!(config.crawler.parallelism, 8);
        assert!(config.crawler.include_databases.is_empty());
        assert_eq!(config.locations.min_depth, 1);
        assert_eq!(config.locations.isolation_threshold, None);
        assert_eq!(config.telemetry.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_isolation_threshold_override() {
        let config: AppConfig = Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Toml::string("[locations]\nisolation_threshold = 10\n"))
            .extract()
            .unwrap();
        assert_eq!(config.locations.isolation_threshold, Some(10));
    }

    #[test]
    fn test_missing_config_file() {
        let result = AppConfig::load_with_file("/nonexistent/assay.toml");
        assert!(matches!(result, Err(CommonError::InvalidArgument(_))));
    }
}
