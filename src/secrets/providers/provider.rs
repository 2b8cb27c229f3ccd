//! Secret provider trait
//!
//! Defines the capability every secret store integration implements.

use super::retry::RetryPolicy;
use crate::secrets::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Trait for secret providers
///
/// A provider resolves one class of secret source (selected by scheme) to a
/// raw string value. Implementations must be Send + Sync so the manager can
/// share them across tasks, and must never log resolved values.
#[async_trait]
pub trait SecretProvider: Send + Sync + fmt::Debug {
    /// Unique provider name; the manager rejects duplicates.
    fn name(&self) -> &str;

    /// Validate mandatory configuration and prepare client state.
    ///
    /// Called once by the manager on registration. Must fail with
    /// `SecretsError::ProviderInitialization` when required configuration
    /// (e.g. an access token) is absent, and must not perform network calls
    /// beyond building a client handle.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Cheap, pure scheme check. Must not panic.
    fn can_handle(&self, source: &str) -> bool;

    /// Perform a single lookup.
    ///
    /// Returns a trimmed, non-empty value. A blank payload is an
    /// `EmptySecret` error. Retries and per-attempt timeouts are applied by
    /// the caller through [`RetryPolicy`].
    async fn resolve(&self, source: &str) -> Result<String>;

    /// Best-effort liveness check. Never fails; `false` on any problem.
    async fn test_connection(&self) -> bool;

    /// Release client resources. Idempotent.
    async fn cleanup(&self) {}

    /// Retry and timeout policy applied around [`SecretProvider::resolve`].
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

/// Strip `scheme://` from `source`, returning the remainder if it matches.
pub(crate) fn strip_scheme<'a>(source: &'a str, scheme: &str) -> Option<&'a str> {
    source.strip_prefix(scheme).and_then(|rest| rest.strip_prefix("://"))
}
