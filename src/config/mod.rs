//! # Configuration Management
//!
//! Typed configuration loaded from TOML with environment overrides:
//!
//! ```toml
//! [secrets.cache]
//! ttl_seconds = 300
//!
//! [secrets.rotation]
//! enabled = true
//! check_interval = "*/15 * * * *"
//!
//! [secrets.providers.vault]
//! address = "https://vault.internal:8200"
//! ```
//!
//! Environment variables (`HERALD_*`, `VAULT_ADDR`, `VAULT_TOKEN`,
//! `VAULT_NAMESPACE`, `AWS_REGION`) take precedence over file values.

mod settings;

pub use crate::secrets::cache::CacheConfig;
pub use crate::secrets::rotation::RotationConfig;
pub use settings::{Config, ObservabilityConfig, ProvidersConfig, SecretsConfig};
