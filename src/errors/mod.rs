//! # Error Handling
//!
//! Crate-level error type. Subsystem errors (see [`crate::secrets::SecretsError`])
//! convert into [`Error`] with `?`.

use crate::secrets::SecretsError;

/// Custom result type for herald operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for herald
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration loading or parsing errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secret resolution, caching, and rotation errors
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration values that parse but are out of range or inconsistent
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        // nested structs report their field paths through `errors()`, so walk it
        fn collect(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<String>) {
            for (field, kind) in errors.errors() {
                let path =
                    if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
                match kind {
                    validator::ValidationErrorsKind::Field(field_errors) => {
                        let messages: Vec<String> = field_errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map_or_else(|| "Invalid value".to_string(), |m| m.to_string())
                            })
                            .collect();
                        out.push(format!("{}: {}", path, messages.join(", ")));
                    }
                    validator::ValidationErrorsKind::Struct(inner) => collect(&path, inner, out),
                    validator::ValidationErrorsKind::List(items) => {
                        for (index, inner) in items {
                            collect(&format!("{}[{}]", path, index), inner, out);
                        }
                    }
                }
            }
        }

        let mut messages = Vec::new();
        collect("", &errors, &mut messages);
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = Error::config("missing file");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: missing file");

        let err = Error::validation("bad ttl");
        assert_eq!(err.to_string(), "Validation error: bad ttl");
    }

    #[test]
    fn test_secrets_error_is_transparent() {
        let err: Error = SecretsError::no_provider_found("unsupported://***").into();
        assert!(matches!(err, Error::Secrets(_)));
        assert_eq!(err.to_string(), SecretsError::no_provider_found("unsupported://***").to_string());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: Error = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
