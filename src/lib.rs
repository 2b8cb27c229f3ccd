//! # Herald
//!
//! Herald posts templated messages to social platforms. This crate holds the
//! part of it that handles credentials: resolving secret sources through
//! pluggable providers, caching the values in-process, and detecting when a
//! secret has been rotated so dependent connections can be refreshed.
//!
//! ## Core Components
//!
//! - **Providers**: file, Vault KV and cloud secret manager backends
//! - **Secret Manager**: ordered provider registry with a TTL cache in front
//! - **Rotation Detector**: cron-scheduled polling that raises rotation events
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use herald::{Config, Result};
//! use herald::secrets::{RotationDetector, SecretManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let manager = Arc::new(SecretManager::new(config.secrets.clone()));
//!     manager.initialize().await?;
//!
//!     let detector = RotationDetector::new(config.secrets.rotation.clone(), manager.clone());
//!     detector.track_secret("vault://vault.internal:8200/secret/data/bot", None, None).await;
//!     detector.start().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

pub use config::Config;
pub use errors::{Error, Result};

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
