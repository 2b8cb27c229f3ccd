//! Error types for secret resolution, caching and rotation detection.
//!
//! Messages produced here never carry secret values. Sources are expected to be
//! masked (see [`super::mask::mask_source`]) before they reach a constructor.

use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while resolving or monitoring secrets.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// `resolve` was called before the manager was initialized.
    #[error("Secret manager is not initialized")]
    NotInitialized,

    /// No registered provider claims the source.
    #[error("No provider found for secret source: {source_ref}")]
    NoProviderFound { source_ref: String },

    /// A provider with the same name is already registered.
    #[error("Provider '{name}' is already registered")]
    DuplicateProvider { name: String },

    /// Mandatory provider configuration is missing or invalid.
    #[error("Failed to initialize provider '{provider}': {message}")]
    ProviderInitialization { provider: String, message: String },

    /// Every attempt of the retry wrapper failed.
    #[error("Provider '{provider}' failed to resolve secret after {attempts} attempt(s): {cause}")]
    ResolutionFailed {
        provider: String,
        attempts: u32,
        #[source]
        cause: Box<SecretsError>,
    },

    /// A single resolution attempt exceeded its time budget.
    #[error("Provider '{provider}' timed out after {duration_ms}ms")]
    Timeout { provider: String, duration_ms: u64 },

    /// Secret does not exist in the backing store.
    #[error("Secret not found: {source_ref}")]
    NotFound { source_ref: String },

    /// The process is not allowed to read the secret.
    #[error("Permission denied reading secret: {source_ref}")]
    PermissionDenied { source_ref: String },

    /// A file source points at a directory.
    #[error("Secret source is a directory, not a file: {source_ref}")]
    IsDirectory { source_ref: String },

    /// The secret resolved to nothing but whitespace.
    #[error("Secret is empty: {source_ref}")]
    EmptySecret { source_ref: String },

    /// The source string does not follow the provider's grammar.
    #[error("Invalid secret source '{source_ref}': {reason}")]
    InvalidSource { source_ref: String, reason: String },

    /// A structured payload did not contain the requested field.
    #[error("Field '{field}' not found in secret: {source_ref}")]
    FieldNotFound { source_ref: String, field: String },

    /// The backend answered with an error.
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// HTTP transport error (for remote backends).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The rotation check interval is not a valid cron expression.
    #[error("Invalid rotation schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecretsError {
    /// Create a no-provider-found error.
    pub fn no_provider_found(source_ref: impl Into<String>) -> Self {
        Self::NoProviderFound { source_ref: source_ref.into() }
    }

    /// Create a duplicate provider error.
    pub fn duplicate_provider(name: impl Into<String>) -> Self {
        Self::DuplicateProvider { name: name.into() }
    }

    /// Create a provider initialization error.
    pub fn provider_initialization(
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProviderInitialization { provider: provider.into(), message: message.into() }
    }

    /// Create a resolution failed error.
    pub fn resolution_failed(
        provider: impl Into<String>,
        attempts: u32,
        cause: SecretsError,
    ) -> Self {
        Self::ResolutionFailed { provider: provider.into(), attempts, cause: Box::new(cause) }
    }

    /// Create a timeout error.
    pub fn timeout(provider: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout { provider: provider.into(), duration_ms }
    }

    /// Create a not found error.
    pub fn not_found(source_ref: impl Into<String>) -> Self {
        Self::NotFound { source_ref: source_ref.into() }
    }

    /// Create a permission denied error.
    pub fn permission_denied(source_ref: impl Into<String>) -> Self {
        Self::PermissionDenied { source_ref: source_ref.into() }
    }

    /// Create an is-directory error.
    pub fn is_directory(source_ref: impl Into<String>) -> Self {
        Self::IsDirectory { source_ref: source_ref.into() }
    }

    /// Create an empty secret error.
    pub fn empty_secret(source_ref: impl Into<String>) -> Self {
        Self::EmptySecret { source_ref: source_ref.into() }
    }

    /// Create an invalid source error.
    pub fn invalid_source(source_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource { source_ref: source_ref.into(), reason: reason.into() }
    }

    /// Create a field not found error.
    pub fn field_not_found(source_ref: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotFound { source_ref: source_ref.into(), field: field.into() }
    }

    /// Create a backend error.
    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    /// Create an invalid schedule error.
    pub fn invalid_schedule(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule { expression: expression.into(), reason: reason.into() }
    }

    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// The provider error underneath any [`SecretsError::ResolutionFailed`] wrapping.
    pub fn root_cause(&self) -> &SecretsError {
        match self {
            Self::ResolutionFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Whether the retry wrapper should make another attempt after this error.
    ///
    /// Malformed sources, missing configuration and payloads that exist but
    /// are unusable fail the same way every time. Missing secrets, denied
    /// access, timeouts and transport errors may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidSource { .. }
                | Self::IsDirectory { .. }
                | Self::EmptySecret { .. }
                | Self::FieldNotFound { .. }
                | Self::ProviderInitialization { .. }
                | Self::NotInitialized
                | Self::NoProviderFound { .. }
                | Self::DuplicateProvider { .. }
                | Self::Config { .. }
        )
    }
}

impl From<reqwest::Error> for SecretsError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the full URL in its Display output; keep only the kind.
        let kind = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_decode() {
            "invalid response body"
        } else if err.is_status() {
            "unexpected status"
        } else {
            "request error"
        };
        Self::Http(kind.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = SecretsError::no_provider_found("unsupported://***");
        assert!(matches!(err, SecretsError::NoProviderFound { .. }));
        assert_eq!(err.to_string(), "No provider found for secret source: unsupported://***");

        let err = SecretsError::duplicate_provider("file");
        assert_eq!(err.to_string(), "Provider 'file' is already registered");

        let err = SecretsError::empty_secret("file:///run/secrets/***");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_resolution_failed_names_provider_and_attempts() {
        let err = SecretsError::resolution_failed("vault", 3, SecretsError::Http("connection failed".into()));
        let msg = err.to_string();
        assert!(msg.contains("vault"));
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("connection failed"));
        assert!(matches!(err.root_cause(), SecretsError::Http(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_retry_classification() {
        assert!(SecretsError::timeout("vault", 100).is_retryable());
        assert!(SecretsError::not_found("file://***").is_retryable());
        assert!(SecretsError::Http("connection failed".into()).is_retryable());

        assert!(!SecretsError::is_directory("file:///run/***").is_retryable());
        assert!(!SecretsError::empty_secret("file:///run/***").is_retryable());
        assert!(!SecretsError::field_not_found("vault://host/secret/***", "token").is_retryable());
        assert!(!SecretsError::invalid_source("vault://***", "missing path").is_retryable());
        assert!(!SecretsError::invalid_source("vault://***", "missing path").is_retryable());
        assert!(!SecretsError::provider_initialization("vault", "no token").is_retryable());
    }
}
