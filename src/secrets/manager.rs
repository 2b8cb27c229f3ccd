//! Secret manager
//!
//! Owns the ordered provider list and the secret cache, and is the single
//! entry point for resolving a source. Providers are consulted in
//! registration order; the first whose `can_handle` accepts the source wins.

use super::cache::{CacheConfigUpdate, CacheStats, SecretCache};
use super::error::{Result, SecretsError};
use super::mask::mask_source;
use super::providers::{
    resolve_with_retry, CloudSecretProvider, FileSecretProvider, SecretProvider, VaultSecretProvider,
};
use super::types::{ResolveOptions, SecretResult, SecretString};
use crate::config::SecretsConfig;
use crate::observability::metrics;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn, Instrument};

/// Resolves secret sources through registered providers with caching
pub struct SecretManager {
    config: SecretsConfig,
    providers: RwLock<Vec<Arc<dyn SecretProvider>>>,
    cache: SecretCache,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

impl std::fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers = self
            .providers
            .try_read()
            .map(|p| p.iter().map(|p| p.name().to_string()).collect::<Vec<_>>())
            .unwrap_or_default();
        f.debug_struct("SecretManager")
            .field("providers", &providers)
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .finish()
    }
}

impl SecretManager {
    /// Create a manager with no providers; call [`SecretManager::initialize`]
    /// before resolving.
    pub fn new(config: SecretsConfig) -> Self {
        let cache = SecretCache::new(config.cache);
        Self {
            config,
            providers: RwLock::new(Vec::new()),
            cache,
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    /// Register the built-in providers enabled in configuration
    ///
    /// File is registered first, then Vault, then cloud. A built-in whose name
    /// is already registered is skipped, as is the cloud provider when this
    /// build has no cloud client. A second call logs a warning and returns.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            warn!("Secret manager already initialized; ignoring repeated initialize()");
            return Ok(());
        }

        let providers = &self.config.providers;
        let default_retry = providers.retry;

        if providers.file.enabled {
            let file = FileSecretProvider::new(providers.file.clone(), default_retry);
            self.register_builtin(Arc::new(file)).await?;
        } else {
            debug!("File secret provider disabled");
        }

        match &providers.vault {
            Some(vault_config) => {
                let vault = VaultSecretProvider::new(vault_config.clone(), default_retry)?;
                self.register_builtin(Arc::new(vault)).await?;
            }
            None => debug!("Vault provider not configured"),
        }

        match &providers.cloud {
            Some(cloud_config) if CloudSecretProvider::is_available() => {
                let cloud = CloudSecretProvider::new(cloud_config.clone(), default_retry);
                self.register_builtin(Arc::new(cloud)).await?;
            }
            Some(_) => debug!("Cloud provider configured but no cloud client is compiled in; skipping"),
            None => debug!("Cloud provider not configured"),
        }

        self.initialized.store(true, Ordering::Release);
        let names = self.provider_names().await;
        info!(providers = ?names, "Secret manager initialized");
        Ok(())
    }

    async fn register_builtin(&self, provider: Arc<dyn SecretProvider>) -> Result<()> {
        if self.has_provider(provider.name()).await {
            debug!(provider = %provider.name(), "Provider already registered; skipping built-in");
            return Ok(());
        }
        self.register_provider(provider).await
    }

    /// Register a provider after the current ones
    ///
    /// Runs the provider's `initialize`; a failure there is returned and the
    /// provider is not added.
    pub async fn register_provider(&self, provider: Arc<dyn SecretProvider>) -> Result<()> {
        let name = provider.name().to_string();
        if self.has_provider(&name).await {
            return Err(SecretsError::duplicate_provider(name));
        }

        provider.initialize().await?;

        let mut providers = self.providers.write().await;
        // a concurrent registration may have won while we initialized
        if providers.iter().any(|p| p.name() == name) {
            drop(providers);
            provider.cleanup().await;
            return Err(SecretsError::duplicate_provider(name));
        }
        providers.push(provider);

        info!(provider = %name, "Registered secret provider");
        Ok(())
    }

    /// Remove a provider by name, running its cleanup
    pub async fn unregister_provider(&self, name: &str) -> bool {
        let removed = {
            let mut providers = self.providers.write().await;
            let index = providers.iter().position(|p| p.name() == name);
            index.map(|i| providers.remove(i))
        };

        match removed {
            Some(provider) => {
                provider.cleanup().await;
                info!(provider = %name, "Unregistered secret provider");
                true
            }
            None => false,
        }
    }

    /// Names of registered providers in registration order
    pub async fn provider_names(&self) -> Vec<String> {
        self.providers.read().await.iter().map(|p| p.name().to_string()).collect()
    }

    async fn has_provider(&self, name: &str) -> bool {
        self.providers.read().await.iter().any(|p| p.name() == name)
    }

    /// Whether [`SecretManager::initialize`] has completed
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn select_provider(&self, source: &str) -> Option<Arc<dyn SecretProvider>> {
        self.providers.read().await.iter().find(|p| p.can_handle(source)).cloned()
    }

    /// Resolve a source, serving from the cache when possible
    pub async fn resolve(&self, source: &str) -> Result<SecretResult> {
        self.resolve_with(source, ResolveOptions::default()).await
    }

    /// Resolve a source with explicit options
    ///
    /// With `bypass_cache` the provider is always called; the fresh value is
    /// still written to the cache.
    pub async fn resolve_with(&self, source: &str, options: ResolveOptions) -> Result<SecretResult> {
        let span = crate::secret_span!("resolve", source, bypass_cache = options.bypass_cache);
        self.resolve_inner(source, options).instrument(span).await
    }

    async fn resolve_inner(&self, source: &str, options: ResolveOptions) -> Result<SecretResult> {
        if !self.is_initialized() {
            return Err(SecretsError::NotInitialized);
        }

        let masked = mask_source(source);

        if !options.bypass_cache {
            if let Some(hit) = self.cache.get(source).await {
                return Ok(hit);
            }
        }

        let provider = self
            .select_provider(source)
            .await
            .ok_or_else(|| SecretsError::no_provider_found(&masked))?;
        tracing::Span::current().record("provider", provider.name());

        match resolve_with_retry(provider.as_ref(), source).await {
            Ok(value) => {
                metrics::record_resolution(provider.name(), true);
                let result = SecretResult::fresh(source, provider.name(), SecretString::new(value));
                self.cache.set(source, &result).await;
                debug!(source = %masked, provider = %provider.name(), "Resolved secret");
                Ok(result)
            }
            Err(e) => {
                metrics::record_resolution(provider.name(), false);
                warn!(source = %masked, provider = %provider.name(), error = %e, "Failed to resolve secret");
                Err(e)
            }
        }
    }

    /// Invalidate one cached source, or the whole cache when `source` is `None`
    pub async fn clear_cache(&self, source: Option<&str>) {
        match source {
            Some(source) => {
                self.cache.delete(source).await;
            }
            None => self.cache.clear().await,
        }
    }

    /// Run every provider's connection test
    ///
    /// A test that does not answer within the provider's attempt timeout
    /// counts as failed.
    pub async fn test_connections(&self) -> BTreeMap<String, bool> {
        let providers: Vec<_> = self.providers.read().await.clone();
        let mut results = BTreeMap::new();

        for provider in providers {
            let deadline = provider.retry_policy().attempt_timeout();
            let healthy = tokio::time::timeout(deadline, provider.test_connection())
                .await
                .unwrap_or(false);
            if !healthy {
                warn!(provider = %provider.name(), "Secret provider connection test failed");
            }
            results.insert(provider.name().to_string(), healthy);
        }

        results
    }

    /// Cache statistics
    pub async fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Change cache settings without a restart
    pub async fn update_cache_config(&self, update: CacheConfigUpdate) {
        self.cache.update_config(update).await;
    }

    /// Release every provider's resources; the manager stays usable for
    /// cache reads only until providers are registered again.
    pub async fn shutdown(&self) {
        let providers: Vec<_> = self.providers.write().await.drain(..).collect();
        for provider in providers {
            provider.cleanup().await;
        }
        self.cache.clear().await;
        info!("Secret manager shut down");
    }
}
