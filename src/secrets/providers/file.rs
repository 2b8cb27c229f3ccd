//! File secret provider
//!
//! Reads secrets from local files (`file://<path>`), e.g. Docker/Kubernetes
//! secret mounts. Relative paths resolve against the configured base
//! directory, or the process working directory when none is set.

use super::provider::{strip_scheme, SecretProvider};
use super::retry::RetryPolicy;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::mask::mask_source;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scheme handled by [`FileSecretProvider`]
pub const FILE_SCHEME: &str = "file";

fn default_enabled() -> bool {
    true
}

/// Configuration for the file provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileProviderConfig {
    /// Register the provider at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory that relative `file://` paths are resolved against
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Retry policy override (falls back to the shared provider policy)
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl Default for FileProviderConfig {
    fn default() -> Self {
        Self { enabled: true, base_dir: None, retry: None }
    }
}

/// Secret provider backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSecretProvider {
    base_dir: Option<PathBuf>,
    retry: RetryPolicy,
}

impl Default for FileSecretProvider {
    fn default() -> Self {
        Self::new(FileProviderConfig::default(), RetryPolicy::default())
    }
}

impl FileSecretProvider {
    /// Create a file provider; `default_retry` applies unless the config overrides it.
    pub fn new(config: FileProviderConfig, default_retry: RetryPolicy) -> Self {
        Self { base_dir: config.base_dir, retry: config.retry.unwrap_or(default_retry) }
    }

    /// Turn a `file://` source into the path to read.
    fn path_for(&self, source: &str) -> Result<PathBuf> {
        let raw = strip_scheme(source, FILE_SCHEME).ok_or_else(|| {
            SecretsError::invalid_source(mask_source(source), "expected file://<path>")
        })?;

        if raw.trim().is_empty() {
            return Err(SecretsError::invalid_source(mask_source(source), "empty file path"));
        }

        let path = Path::new(raw);
        Ok(match (&self.base_dir, path.is_relative()) {
            (Some(base), true) => base.join(path),
            _ => path.to_path_buf(),
        })
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, source: &str) -> bool {
        strip_scheme(source, FILE_SCHEME).is_some()
    }

    async fn resolve(&self, source: &str) -> Result<String> {
        let masked = mask_source(source);
        let path = self.path_for(source)?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SecretsError::not_found(&masked),
            ErrorKind::PermissionDenied => SecretsError::permission_denied(&masked),
            _ => SecretsError::Io(e),
        })?;

        if metadata.is_dir() {
            return Err(SecretsError::is_directory(&masked));
        }

        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SecretsError::not_found(&masked),
            ErrorKind::PermissionDenied => SecretsError::permission_denied(&masked),
            _ => SecretsError::Io(e),
        })?;

        let value = contents.trim();
        if value.is_empty() {
            return Err(SecretsError::empty_secret(&masked));
        }

        debug!(source = %masked, "Read secret from file");
        Ok(value.to_string())
    }

    async fn test_connection(&self) -> bool {
        match &self.base_dir {
            Some(base) => tokio::fs::metadata(base).await.map(|m| m.is_dir()).unwrap_or(false),
            None => true,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}
