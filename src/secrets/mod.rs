//! Secret resolution, caching and rotation detection.
//!
//! Credentials are referenced by an opaque, scheme-prefixed *source* string and
//! resolved on demand:
//!
//! - `file://<path>` reads a local file
//! - `vault://<host>[:port]/<path>[?version=N&field=name]` reads a Vault KV secret
//! - `cloud://<secret-id-or-arn>[?key=field&region=...]` reads a cloud
//!   secret manager entry (`aws` feature)
//!
//! # Architecture
//!
//! ```text
//! caller ──► SecretManager::resolve ──► SecretCache (hit) ──► SecretResult
//!                    │
//!                    └─► first provider whose can_handle() matches
//!                        └─► resolve_with_retry ──► cache.set ──► SecretResult
//!
//! RotationDetector ──(cron)──► check_rotations ──► manager.resolve_with(bypass)
//!                                   └─► changed? clear cache entry, publish RotationEvent
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use herald::config::SecretsConfig;
//! use herald::secrets::SecretManager;
//!
//! # async fn example() -> herald::secrets::Result<()> {
//! let manager = SecretManager::new(SecretsConfig::default());
//! manager.initialize().await?;
//!
//! let token = manager.resolve("file:///run/secrets/bot-token").await?;
//! let _header = format!("Bearer {}", token.value.expose_secret());
//! # Ok(())
//! # }
//! ```
//!
//! Sources in logs, errors and status output are masked with [`mask_source`];
//! values are only reachable through [`SecretString::expose_secret`].

pub mod cache;
pub mod error;
pub mod manager;
pub mod mask;
pub mod providers;
pub mod rotation;
pub mod types;

pub use cache::{CacheConfig, CacheConfigUpdate, CacheStats, SecretCache};
pub use error::{Result, SecretsError};
pub use manager::SecretManager;
pub use mask::{mask_source, MASK};
pub use providers::SecretProvider;
pub use rotation::{
    CheckSummary, ConnectionTester, RotationConfig, RotationDetector, RotationEvent, RotationStats,
    TrackedSecret, TrackedSecretView,
};
pub use types::{ResolveOptions, SecretMetadata, SecretResult, SecretString};
