//! # Structured Logging
//!
//! Subscriber setup and span macros. Every field that names a secret carries a
//! masked source (see [`crate::secrets::mask_source`]); values are never
//! recorded.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for a secret operation.
///
/// The source is masked before it is recorded:
///
/// ```rust,ignore
/// let span = secret_span!("resolve", "vault://vault.internal/kv/data/bot/token");
/// let span = secret_span!("check", source, attempt = 2);
/// ```
#[macro_export]
macro_rules! secret_span {
    ($operation:expr, $source:expr) => {
        tracing::info_span!(
            "secret_operation",
            operation = %$operation,
            source = %$crate::secrets::mask_source($source),
            provider = tracing::field::Empty
        )
    };
    ($operation:expr, $source:expr, $($field:tt)*) => {
        tracing::info_span!(
            "secret_operation",
            operation = %$operation,
            source = %$crate::secrets::mask_source($source),
            provider = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `log_level`. When `log_dir` is set a daily-rolling file
/// sink is added; keep the returned guard alive until exit so buffered lines
/// are flushed. If a subscriber is already installed this is a no-op.
pub fn init_logging(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.log_file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logging {
        registry
            .with(fmt::layer().json().with_target(true))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
    };

    if installed.is_err() {
        // another subscriber (tests, embedding application) owns the process
        return Ok(None);
    }

    Ok(guard)
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::Config) {
    let providers = &config.secrets.providers;
    tracing::info!(
        cache_enabled = config.secrets.cache.enabled,
        cache_ttl_secs = config.secrets.cache.ttl_seconds,
        cache_max_size = config.secrets.cache.max_size,
        rotation_enabled = config.secrets.rotation.enabled,
        check_interval = %config.secrets.rotation.check_interval,
        file_provider = providers.file.enabled,
        vault_provider = providers.vault.is_some(),
        cloud_provider = providers.cloud.is_some(),
        json_logging = config.observability.json_logging,
        "herald secrets configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = secret_span!("resolve", "file:///run/secrets/token");
        let _span = secret_span!("check", "vault://vault/kv/bot", attempt = 2);
    }

    #[test]
    fn test_init_logging_twice_is_noop() {
        let config = ObservabilityConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::Config::default();
        log_config_info(&config);
    }
}
