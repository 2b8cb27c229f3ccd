//! Secure value types and resolution results.
//!
//! [`SecretString`] keeps resolved values out of logs, debug output and
//! serialized status payloads. [`SecretResult`] is what the manager hands back
//! to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string wrapper that redacts its contents in Debug, Display, and serialization.
///
/// # Security
///
/// - Debug output shows `SecretString([REDACTED])` instead of the actual value
/// - Display output shows `[REDACTED]`
/// - Serialization outputs `"[REDACTED]"` (NEVER the actual value)
/// - Deserialization works normally (accepts actual secret values, e.g. a
///   Vault token in the config file)
/// - Memory is zeroed when dropped (via `zeroize`)
///
/// The value is only reachable through [`SecretString::expose_secret`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl SecretString {
    /// Creates a new SecretString from a string value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value.
    ///
    /// Never log or print the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Returns the length of the secret without exposing the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Metadata recorded alongside every resolved secret.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SecretMetadata {
    /// The source string exactly as the caller passed it (cache key).
    #[serde(skip)]
    pub source: String,

    /// Name of the provider that produced the value.
    pub provider_name: String,

    /// When the provider returned the value.
    pub resolved_at: DateTime<Utc>,

    /// Number of cache hits served for this value.
    pub access_count: u64,
}

impl SecretMetadata {
    /// Create metadata for a fresh provider resolution.
    pub fn new(source: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            provider_name: provider_name.into(),
            resolved_at: Utc::now(),
            access_count: 0,
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretResult {
    /// The resolved, trimmed, non-empty value.
    pub value: SecretString,

    /// Where it came from and how often the cached copy was read.
    pub metadata: SecretMetadata,

    /// `true` when served from the cache, `false` for a fresh provider call.
    pub cached: bool,
}

impl SecretResult {
    /// Build a result for a value that was just fetched from a provider.
    pub fn fresh(
        source: impl Into<String>,
        provider_name: impl Into<String>,
        value: SecretString,
    ) -> Self {
        Self { value, metadata: SecretMetadata::new(source, provider_name), cached: false }
    }
}

/// Per-call options for [`super::SecretManager::resolve_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Skip the cache lookup and always call the provider.
    pub bypass_cache: bool,
}

impl ResolveOptions {
    /// Options that force a provider call.
    pub fn bypass_cache() -> Self {
        Self { bypass_cache: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redacts_debug_and_display() {
        let secret = SecretString::new("super-secret-value");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_secret_string_expose() {
        let secret = SecretString::new("my-secret");
        assert_eq!(secret.expose_secret(), "my-secret");
        assert_eq!(secret.len(), 9);
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_secret_string_serialization_redacts() {
        let secret = SecretString::new("super-secret-value");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_secret_string_deserialization_accepts_values() {
        let secret: SecretString = serde_json::from_str("\"s.vault-token\"").unwrap();
        assert_eq!(secret.expose_secret(), "s.vault-token");
    }

    #[test]
    fn test_secret_result_debug_hides_value() {
        let result = SecretResult::fresh("file:///run/token", "file", "hunter2".into());
        let debug_output = format!("{:?}", result);
        assert!(!debug_output.contains("hunter2"));
        assert!(!result.cached);
        assert_eq!(result.metadata.access_count, 0);
        assert_eq!(result.metadata.provider_name, "file");
    }

    #[test]
    fn test_metadata_serialization_skips_source() {
        let metadata = SecretMetadata::new("vault://vault.internal/secret/data/bot", "vault");
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(!json.contains("vault.internal"));
        assert!(json.contains("provider_name"));
    }
}
