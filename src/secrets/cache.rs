//! Secret cache for reducing provider calls
//!
//! An in-memory, size-bounded TTL cache keyed by the source string. Expired
//! entries are dropped lazily by the read that discovers them. When full,
//! inserting a new source evicts the least recently used entry.

use super::mask::mask_source;
use crate::observability::metrics;
use super::types::{SecretMetadata, SecretResult, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use validator::Validate;

fn default_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_max_size() -> usize {
    100
}

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// Enable caching of resolved secrets
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Time-to-live of an entry in seconds
    #[serde(default = "default_ttl_seconds")]
    #[validate(range(min = 1, max = 86400, message = "Cache TTL must be between 1 second and 1 day"))]
    pub ttl_seconds: u64,

    /// Maximum number of cached sources
    #[serde(default = "default_max_size")]
    #[validate(range(max = 100000, message = "Cache max_size must be at most 100000"))]
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_seconds: default_ttl_seconds(),
            max_size: default_max_size(),
        }
    }
}

impl CacheConfig {
    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Partial update applied to a live cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfigUpdate {
    pub enabled: Option<bool>,
    pub ttl: Option<Duration>,
    pub max_size: Option<usize>,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// Sum of hit counts over the entries currently cached
    pub total_access_count: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Cached secret entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry {
    value: SecretString,
    metadata: SecretMetadata,
    inserted_at: Instant,
    access_count: u64,
    /// Logical clock of the last insert or hit, for LRU eviction
    last_touch: u64,
}

#[derive(Debug)]
struct CacheState {
    config: CacheConfig,
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.inserted_at.elapsed() >= self.ttl
    }

    /// Evict until there is room for one more entry.
    fn make_room(&mut self) {
        // expired entries go first
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        while !self.entries.is_empty() && self.entries.len() >= self.config.max_size {
            self.evict_lru();
        }
    }

    fn shrink_to_fit(&mut self) {
        while self.entries.len() > self.config.max_size {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_touch)
            .map(|(source, _)| source.clone());

        if let Some(source) = victim {
            debug!(source = %mask_source(&source), "Evicting cached secret");
            self.entries.remove(&source);
        }
    }
}

/// Size- and TTL-bounded secret cache
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone)]
pub struct SecretCache {
    inner: Arc<RwLock<CacheState>>,
}

impl SecretCache {
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheState {
                config,
                ttl: config.ttl(),
                entries: HashMap::new(),
                clock: 0,
                hits: 0,
                misses: 0,
            })),
        }
    }

    /// Get a cached secret if present and not expired
    ///
    /// A hit increments the entry's access count and returns it with
    /// `cached = true`. An expired entry is removed.
    pub async fn get(&self, source: &str) -> Option<SecretResult> {
        let mut state = self.inner.write().await;
        if !state.config.enabled {
            return None;
        }

        let expired = state.entries.get(source).map(|entry| state.is_expired(entry));
        match expired {
            None => {
                state.misses += 1;
                metrics::record_cache_lookup(false);
                return None;
            }
            Some(true) => {
                debug!(source = %mask_source(source), "Cache entry expired");
                state.entries.remove(source);
                state.misses += 1;
                metrics::record_cache_lookup(false);
                return None;
            }
            Some(false) => {}
        }

        let touch = state.tick();
        state.hits += 1;
        let entry = state.entries.get_mut(source)?;
        entry.access_count += 1;
        entry.last_touch = touch;

        let mut metadata = entry.metadata.clone();
        metadata.access_count = entry.access_count;
        let result = SecretResult { value: entry.value.clone(), metadata, cached: true };

        debug!(source = %mask_source(source), access_count = entry.access_count, "Cache hit for secret");
        metrics::record_cache_lookup(true);
        Some(result)
    }

    /// Insert a secret into the cache
    ///
    /// No-op when the cache is disabled or `max_size` is 0.
    pub async fn set(&self, source: &str, result: &SecretResult) {
        let mut state = self.inner.write().await;
        if !state.config.enabled || state.config.max_size == 0 {
            return;
        }

        if !state.entries.contains_key(source) {
            state.make_room();
        }

        let touch = state.tick();
        debug!(source = %mask_source(source), ttl_secs = state.ttl.as_secs(), "Caching secret");
        state.entries.insert(
            source.to_string(),
            CacheEntry {
                value: result.value.clone(),
                metadata: result.metadata.clone(),
                inserted_at: Instant::now(),
                access_count: 0,
                last_touch: touch,
            },
        );
    }

    /// Invalidate a specific cache entry
    pub async fn delete(&self, source: &str) -> bool {
        let removed = self.inner.write().await.entries.remove(source).is_some();
        if removed {
            debug!(source = %mask_source(source), "Invalidated cached secret");
        }
        removed
    }

    /// Clear all cache entries
    pub async fn clear(&self) {
        let mut state = self.inner.write().await;
        debug!(count = state.entries.len(), "Clearing entire secret cache");
        state.entries.clear();
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.read().await;
        CacheStats {
            size: state.entries.len(),
            max_size: state.config.max_size,
            enabled: state.config.enabled,
            ttl_seconds: state.ttl.as_secs(),
            total_access_count: state.entries.values().map(|e| e.access_count).sum(),
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Get the current configuration
    pub async fn config(&self) -> CacheConfig {
        self.inner.read().await.config
    }

    /// Apply a partial configuration update without a restart
    ///
    /// Shrinking `max_size` evicts least recently used entries; disabling the
    /// cache drops every entry so no value outlives the change in memory.
    pub async fn update_config(&self, update: CacheConfigUpdate) {
        let mut state = self.inner.write().await;

        if let Some(enabled) = update.enabled {
            state.config.enabled = enabled;
            if !enabled {
                state.entries.clear();
            }
        }
        if let Some(ttl) = update.ttl {
            state.ttl = ttl;
            state.config.ttl_seconds = ttl.as_secs();
        }
        if let Some(max_size) = update.max_size {
            state.config.max_size = max_size;
            state.shrink_to_fit();
        }

        debug!(
            enabled = state.config.enabled,
            ttl_secs = state.ttl.as_secs(),
            max_size = state.config.max_size,
            "Updated secret cache configuration"
        );
    }

    /// Get the number of entries in the cache (including not-yet-discovered expired ones)
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
