//! Shared helpers for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use herald::config::SecretsConfig;
use herald::secrets::providers::{RetryPolicy, SecretProvider};
use herald::secrets::{Result, SecretManager, SecretsError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider for `mock://` sources whose answer is scripted by the test.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    value: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(value: Option<&str>) -> Arc<Self> {
        Self::named("scripted", value)
    }

    pub fn named(name: &str, value: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            value: Mutex::new(value.map(str::to_string)),
            calls: AtomicUsize::new(0),
        })
    }

    /// `None` makes every resolve fail.
    pub fn set(&self, value: Option<&str>) {
        *self.value.lock().unwrap() = value.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, source: &str) -> bool {
        source.starts_with("mock://")
    }

    async fn resolve(&self, source: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SecretsError::not_found(herald::secrets::mask_source(source)))
    }

    async fn test_connection(&self) -> bool {
        true
    }

    fn retry_policy(&self) -> RetryPolicy {
        fast_retry()
    }
}

/// Retry policy with short delays so failure paths finish quickly.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        retry_delay_ms: 10,
        backoff_multiplier: 1.0,
        attempt_timeout_ms: 2_000,
    }
}

/// Secrets config with fast provider retries.
pub fn test_secrets_config() -> SecretsConfig {
    let mut config = SecretsConfig::default();
    config.providers.retry = fast_retry();
    config
}

/// An initialized manager shared the way the application shares it.
pub async fn initialized_manager(config: SecretsConfig) -> Arc<SecretManager> {
    let manager = Arc::new(SecretManager::new(config));
    manager.initialize().await.expect("manager should initialize");
    manager
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_secret(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write secret file");
    path
}

/// `file://` source for an absolute path.
pub fn file_source(path: &Path) -> String {
    format!("file://{}", path.display())
}
