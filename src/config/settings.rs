//! # Configuration Settings
//!
//! Defines the configuration structure for herald.

use crate::errors::{Error, Result};
use crate::secrets::cache::CacheConfig;
use crate::secrets::providers::{CloudProviderConfig, FileProviderConfig, RetryPolicy, VaultProviderConfig};
use crate::secrets::rotation::{parse_schedule, RotationConfig};
use crate::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct Config {
    /// Secret resolution, caching and rotation
    #[serde(default)]
    #[validate(nested)]
    pub secrets: SecretsConfig,

    /// Logging configuration
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Configuration of the secrets subsystem
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct SecretsConfig {
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate(nested)]
    pub rotation: RotationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub providers: ProvidersConfig,
}

/// Per-provider connection settings
///
/// The file provider is always configured; Vault and cloud providers are only
/// registered when their table is present.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct ProvidersConfig {
    /// Shared retry policy, overridable per provider
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub file: FileProviderConfig,

    #[serde(default)]
    pub vault: Option<VaultProviderConfig>,

    #[serde(default)]
    pub cloud: Option<CloudProviderConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file_prefix() -> String {
    "herald.log".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    #[serde(default)]
    pub json_logging: bool,

    /// Directory for daily-rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File name prefix for rolled log files
    #[serde(default = "default_log_file_prefix")]
    #[validate(length(min = 1, message = "Log file prefix cannot be empty"))]
    pub log_file_prefix: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            log_dir: None,
            log_file_prefix: default_log_file_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&contents).map_err(|e| {
            Error::config(format!("Failed to parse config file '{}': {}", path.display(), e))
        })?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults and environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        let rotation = &self.secrets.rotation;
        if let Err(e) = parse_schedule(&rotation.check_interval) {
            return Err(Error::validation(e.to_string()));
        }

        if let Some(vault) = &self.secrets.providers.vault {
            let address = url::Url::parse(&vault.address).map_err(|e| {
                Error::validation(format!("Vault address '{}' is not a URL: {}", vault.address, e))
            })?;
            if address.scheme() != "http" && address.scheme() != "https" {
                return Err(Error::validation("Vault address must use http or https"));
            }
            if vault.timeout_ms == 0 {
                return Err(Error::validation("Vault timeout_ms must be positive"));
            }
        }

        if let Some(cloud) = &self.secrets.providers.cloud {
            if cloud.timeout_ms == 0 {
                return Err(Error::validation("Cloud timeout_ms must be positive"));
            }
            if cloud.access_key_id.is_some() != cloud.secret_access_key.is_some() {
                return Err(Error::validation(
                    "Cloud access_key_id and secret_access_key must be set together",
                ));
            }
        }

        if tracing_subscriber::EnvFilter::try_new(&self.observability.log_level).is_err() {
            return Err(Error::validation(format!(
                "Invalid log level '{}'",
                self.observability.log_level
            )));
        }

        Ok(())
    }

    /// Apply `HERALD_*` variables (and the secret stores' standard variables)
    /// on top of the loaded values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(level) = env_var("HERALD_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(json) = env_bool("HERALD_JSON_LOGGING")? {
            self.observability.json_logging = json;
        }
        if let Some(dir) = env_var("HERALD_LOG_DIR") {
            self.observability.log_dir = Some(PathBuf::from(dir));
        }

        let cache = &mut self.secrets.cache;
        if let Some(enabled) = env_bool("HERALD_CACHE_ENABLED")? {
            cache.enabled = enabled;
        }
        if let Some(ttl) = env_parse("HERALD_CACHE_TTL_SECONDS")? {
            cache.ttl_seconds = ttl;
        }
        if let Some(max_size) = env_parse("HERALD_CACHE_MAX_SIZE")? {
            cache.max_size = max_size;
        }

        let rotation = &mut self.secrets.rotation;
        if let Some(enabled) = env_bool("HERALD_ROTATION_ENABLED")? {
            rotation.enabled = enabled;
        }
        if let Some(interval) = env_var("HERALD_ROTATION_CHECK_INTERVAL") {
            rotation.check_interval = interval;
        }

        if let Some(base_dir) = env_var("HERALD_SECRETS_BASE_DIR") {
            self.secrets.providers.file.base_dir = Some(PathBuf::from(base_dir));
        }

        self.apply_vault_env();
        self.apply_cloud_env();
        Ok(())
    }

    fn apply_vault_env(&mut self) {
        let providers = &mut self.secrets.providers;
        match providers.vault.as_mut() {
            Some(vault) => {
                if let Some(address) = env_var_or("HERALD_VAULT_ADDR", "VAULT_ADDR") {
                    vault.address = address;
                }
                if let Some(token) = env_var_or("HERALD_VAULT_TOKEN", "VAULT_TOKEN") {
                    vault.token = Some(SecretString::new(token));
                }
                if let Some(namespace) = env_var_or("HERALD_VAULT_NAMESPACE", "VAULT_NAMESPACE") {
                    vault.namespace = Some(namespace);
                }
            }
            None => providers.vault = VaultProviderConfig::from_env(),
        }
    }

    fn apply_cloud_env(&mut self) {
        let providers = &mut self.secrets.providers;
        match providers.cloud.as_mut() {
            Some(cloud) => {
                if let Some(region) = env_var("HERALD_CLOUD_REGION") {
                    cloud.region = Some(region);
                } else if cloud.region.is_none() {
                    cloud.region = env_var("AWS_REGION");
                }
                if let Some(endpoint) = env_var("HERALD_CLOUD_ENDPOINT_URL") {
                    cloud.endpoint_url = Some(endpoint);
                }
            }
            None => providers.cloud = CloudProviderConfig::from_env(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_var_or(primary: &str, fallback: &str) -> Option<String> {
    env_var(primary).or_else(|| env_var(fallback))
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match env_var(name) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(Error::config(format!("{} must be a boolean, got '{}'", name, other))),
        },
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| Error::config(format!("Invalid {}: {}", name, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        assert!(config.secrets.cache.enabled);
        assert_eq!(config.secrets.cache.ttl_seconds, 300);
        assert_eq!(config.secrets.cache.max_size, 100);
        assert!(!config.secrets.rotation.enabled);
        assert_eq!(config.secrets.rotation.check_interval, "*/15 * * * *");
        assert!(config.secrets.providers.file.enabled);
        assert_eq!(config.secrets.providers.retry.max_attempts, 3);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [secrets.cache]
            ttl_seconds = 60
            max_size = 10

            [secrets.rotation]
            enabled = true
            check_interval = "0 */5 * * * *"
            max_retries = 1

            [secrets.providers.retry]
            max_attempts = 2
            retry_delay_ms = 100

            [secrets.providers.file]
            base_dir = "/run/secrets"

            [secrets.providers.vault]
            address = "http://vault.internal:8200"
            token = "s.abcdef"

            [observability]
            log_level = "debug"
            json_logging = true
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());

        assert!(config.secrets.cache.enabled);
        assert_eq!(config.secrets.cache.ttl_seconds, 60);
        assert!(config.secrets.rotation.enabled);
        assert_eq!(config.secrets.rotation.max_retries, 1);
        assert!(config.secrets.rotation.retry_on_failure);
        assert_eq!(config.secrets.providers.retry.max_attempts, 2);
        assert_eq!(config.secrets.providers.retry.attempt_timeout_ms, 10_000);
        assert_eq!(
            config.secrets.providers.file.base_dir.as_deref(),
            Some(Path::new("/run/secrets"))
        );

        let vault = config.secrets.providers.vault.as_ref().unwrap();
        assert_eq!(vault.address, "http://vault.internal:8200");
        assert_eq!(vault.token.as_ref().unwrap().expose_secret(), "s.abcdef");
        assert!(config.secrets.providers.cloud.is_none());
        assert!(config.observability.json_logging);
    }

    #[test]
    fn test_serialized_config_redacts_tokens() {
        let mut config = Config::default();
        config.secrets.providers.vault = Some(VaultProviderConfig {
            token: Some(SecretString::new("s.super-secret")),
            ..Default::default()
        });

        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("s.super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = Config::default();
        config.secrets.rotation.check_interval = "every now and then".to_string();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));

        let mut config = Config::default();
        config.secrets.cache.ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.secrets.providers.retry.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));

        let mut config = Config::default();
        config.secrets.providers.vault =
            Some(VaultProviderConfig { address: "not a url".to_string(), ..Default::default() });
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.secrets.providers.cloud = Some(CloudProviderConfig {
            access_key_id: Some("AKIA".to_string()),
            timeout_ms: 1000,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
