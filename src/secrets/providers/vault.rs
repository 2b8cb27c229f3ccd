//! Vault secret provider
//!
//! Reads secrets from a HashiCorp Vault-style KV store over its HTTP API.
//!
//! ## Reference Format
//!
//! `vault://<host>[:port]/<api-path>[?version=N][&field=name]`
//!
//! - `<api-path>` is the path under `/v1/`, e.g. `secret/data/herald` for a KV v2
//!   mount or `kv/herald` for a KV v1 mount
//! - `version` pins a KV v2 version (latest otherwise)
//! - `field` selects a field of a structured payload explicitly
//!
//! ## Response Shapes
//!
//! Both KV generations are accepted:
//!
//! ```json
//! { "data": { "token": "..." } }                               // KV v1
//! { "data": { "data": { "token": "..." }, "metadata": {...} } } // KV v2
//! ```
//!
//! When the payload is an object and no `field` is given, the first present
//! field of [`FIELD_PRIORITY`] wins, then the first string-valued field.

use super::provider::{strip_scheme, SecretProvider};
use super::retry::RetryPolicy;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::mask::mask_source;
use crate::secrets::types::SecretString;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Scheme handled by [`VaultSecretProvider`]
pub const VAULT_SCHEME: &str = "vault";

/// Field names tried, in order, when a payload is an object.
pub const FIELD_PRIORITY: [&str; 5] = ["value", "secret", "password", "token", "key"];

fn default_address() -> String {
    "https://127.0.0.1:8200".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Configuration for the Vault provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultProviderConfig {
    /// Default Vault address; its scheme is used for every `vault://` host and
    /// it is the target of connection tests
    #[serde(default = "default_address")]
    pub address: String,

    /// Vault authentication token
    #[serde(default)]
    pub token: Option<SecretString>,

    /// Vault namespace (for Enterprise)
    #[serde(default)]
    pub namespace: Option<String>,

    /// HTTP client timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry policy override (falls back to the shared provider policy)
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl Default for VaultProviderConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            namespace: None,
            timeout_ms: default_timeout_ms(),
            retry: None,
        }
    }
}

impl VaultProviderConfig {
    /// Load configuration from environment variables
    ///
    /// Uses:
    /// - `HERALD_VAULT_ADDR` or `VAULT_ADDR`
    /// - `HERALD_VAULT_TOKEN` or `VAULT_TOKEN`
    /// - `HERALD_VAULT_NAMESPACE` or `VAULT_NAMESPACE`
    ///
    /// Returns `None` when no address is set.
    pub fn from_env() -> Option<Self> {
        let address =
            std::env::var("HERALD_VAULT_ADDR").or_else(|_| std::env::var("VAULT_ADDR")).ok()?;

        let token = std::env::var("HERALD_VAULT_TOKEN")
            .or_else(|_| std::env::var("VAULT_TOKEN"))
            .ok()
            .map(SecretString::from);

        let namespace = std::env::var("HERALD_VAULT_NAMESPACE")
            .or_else(|_| std::env::var("VAULT_NAMESPACE"))
            .ok();

        Some(Self { address, token, namespace, ..Self::default() })
    }
}

/// A parsed `vault://` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VaultReference {
    pub authority: String,
    pub path: String,
    pub version: Option<u64>,
    pub field: Option<String>,
}

impl VaultReference {
    pub(crate) fn parse(source: &str) -> Result<Self> {
        let masked = mask_source(source);
        let rest = strip_scheme(source, VAULT_SCHEME).ok_or_else(|| {
            SecretsError::invalid_source(&masked, "expected vault://<host>/<path>")
        })?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (authority, path) = location
            .split_once('/')
            .ok_or_else(|| SecretsError::invalid_source(&masked, "missing secret path"))?;
        let path = path.trim_matches('/');

        if authority.is_empty() {
            return Err(SecretsError::invalid_source(&masked, "missing host"));
        }
        if path.is_empty() {
            return Err(SecretsError::invalid_source(&masked, "missing secret path"));
        }

        let mut version = None;
        let mut field = None;
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "version" => {
                        let parsed = value.parse::<u64>().map_err(|_| {
                            SecretsError::invalid_source(&masked, "version must be a number")
                        })?;
                        version = Some(parsed);
                    }
                    "field" => field = Some(value.into_owned()),
                    other => {
                        debug!(source = %masked, parameter = %other, "Ignoring unknown vault parameter")
                    }
                }
            }
        }

        Ok(Self { authority: authority.to_string(), path: path.to_string(), version, field })
    }
}

/// Vault KV secret provider
pub struct VaultSecretProvider {
    client: reqwest::Client,
    address: String,
    scheme: String,
    token: Option<SecretString>,
    namespace: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for VaultSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretProvider")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl VaultSecretProvider {
    /// Create a new Vault provider with the given configuration
    ///
    /// Builds the HTTP client only; the token is checked by
    /// [`SecretProvider::initialize`].
    pub fn new(config: VaultProviderConfig, default_retry: RetryPolicy) -> Result<Self> {
        let address = url::Url::parse(&config.address).map_err(|e| {
            SecretsError::provider_initialization(
                "vault",
                format!("invalid Vault address '{}': {}", config.address, e),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                SecretsError::provider_initialization(
                    "vault",
                    format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            scheme: address.scheme().to_string(),
            address: config.address.trim_end_matches('/').to_string(),
            token: config.token,
            namespace: config.namespace,
            retry: config.retry.unwrap_or(default_retry),
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header("X-Vault-Token", token.expose_secret());
        }
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        request
    }

    fn url_for(&self, reference: &VaultReference) -> String {
        let mut url = format!("{}://{}/v1/{}", self.scheme, reference.authority, reference.path);
        if let Some(version) = reference.version {
            url.push_str(&format!("?version={}", version));
        }
        url
    }
}

/// Unwrap the KV response envelope.
///
/// KV v2 nests the secret under `data.data` next to `data.metadata`; KV v1
/// returns it directly under `data`.
pub(crate) fn unwrap_kv_payload(body: Value, masked: &str) -> Result<Value> {
    let Value::Object(mut envelope) = body else {
        return Err(SecretsError::backend_error("Vault response is not a JSON object"));
    };

    let outer = envelope
        .remove("data")
        .ok_or_else(|| SecretsError::backend_error("Vault response has no 'data' field"))?;

    let payload = match outer {
        Value::Object(mut data) if data.contains_key("metadata") && data.contains_key("data") => {
            data.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    // KV v2 returns `data: null` for deleted or destroyed versions
    if payload.is_null() {
        return Err(SecretsError::not_found(masked));
    }

    Ok(payload)
}

/// Pick the secret value out of a decoded payload.
pub(crate) fn select_value(payload: &Value, field: Option<&str>, masked: &str) -> Result<String> {
    let value = match payload {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => {
            if let Some(field) = field {
                match map.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => return Err(SecretsError::field_not_found(masked, field)),
                }
            } else if let Some((name, s)) = FIELD_PRIORITY
                .iter()
                .find_map(|name| map.get(*name).and_then(Value::as_str).map(|s| (*name, s)))
            {
                debug!(source = %masked, field = %name, "Using well-known field from Vault payload");
                s.to_string()
            } else if let Some((name, s)) =
                map.iter().find_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
            {
                info!(source = %masked, field = %name, "Using first string field from Vault payload");
                s.to_string()
            } else {
                return Err(SecretsError::backend_error(format!(
                    "Vault payload for '{}' has no string field",
                    masked
                )));
            }
        }
        _ => {
            return Err(SecretsError::backend_error(format!(
                "Vault payload for '{}' has an unsupported type",
                masked
            )))
        }
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SecretsError::empty_secret(masked));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl SecretProvider for VaultSecretProvider {
    fn name(&self) -> &str {
        "vault"
    }

    async fn initialize(&self) -> Result<()> {
        match &self.token {
            Some(token) if !token.expose_secret().trim().is_empty() => {
                info!(address = %self.address, namespace = ?self.namespace, "Initialized Vault secret provider");
                Ok(())
            }
            _ => Err(SecretsError::provider_initialization(
                "vault",
                "missing access token (set HERALD_VAULT_TOKEN or VAULT_TOKEN)",
            )),
        }
    }

    fn can_handle(&self, source: &str) -> bool {
        strip_scheme(source, VAULT_SCHEME).is_some()
    }

    async fn resolve(&self, source: &str) -> Result<String> {
        let masked = mask_source(source);
        let reference = VaultReference::parse(source)?;

        debug!(source = %masked, version = ?reference.version, "Fetching secret from Vault");

        let response = self.request(&self.url_for(&reference)).send().await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(SecretsError::not_found(&masked)),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(SecretsError::permission_denied(&masked))
            }
            status => {
                return Err(SecretsError::backend_error(format!(
                    "Vault returned status {} for '{}'",
                    status.as_u16(),
                    masked
                )))
            }
        }

        let body: Value = response.json().await?;
        let payload = unwrap_kv_payload(body, &masked)?;
        select_value(&payload, reference.field.as_deref(), &masked)
    }

    async fn test_connection(&self) -> bool {
        let url = format!("{}/v1/sys/health", self.address);
        match self.request(&url).send().await {
            // 429 = unsealed standby, still able to serve reads
            Ok(response) => {
                response.status().is_success()
                    || response.status() == StatusCode::TOO_MANY_REQUESTS
            }
            Err(e) => {
                warn!(address = %self.address, error = %SecretsError::from(e), "Vault health check failed");
                false
            }
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reference() {
        let reference = VaultReference::parse("vault://vault.internal:8200/secret/data/herald").unwrap();
        assert_eq!(reference.authority, "vault.internal:8200");
        assert_eq!(reference.path, "secret/data/herald");
        assert_eq!(reference.version, None);
        assert_eq!(reference.field, None);
    }

    #[test]
    fn test_parse_reference_with_query() {
        let reference =
            VaultReference::parse("vault://vault/secret/data/herald?version=4&field=access_token")
                .unwrap();
        assert_eq!(reference.version, Some(4));
        assert_eq!(reference.field.as_deref(), Some("access_token"));
    }

    #[test]
    fn test_parse_reference_errors() {
        assert!(VaultReference::parse("vault://vault").is_err());
        assert!(VaultReference::parse("vault:///secret/x").is_err());
        assert!(VaultReference::parse("vault://vault/").is_err());
        assert!(VaultReference::parse("vault://vault/secret?version=latest").is_err());
        assert!(VaultReference::parse("file:///x").is_err());
    }

    #[test]
    fn test_unwrap_kv_v1_shape() {
        let payload = unwrap_kv_payload(json!({ "data": { "token": "abc" } }), "m").unwrap();
        assert_eq!(payload, json!({ "token": "abc" }));
    }

    #[test]
    fn test_unwrap_kv_v2_shape() {
        let body = json!({
            "data": { "data": { "password": "p4ss" }, "metadata": { "version": 2 } }
        });
        let payload = unwrap_kv_payload(body, "m").unwrap();
        assert_eq!(payload, json!({ "password": "p4ss" }));
    }

    #[test]
    fn test_unwrap_deleted_version() {
        let body = json!({ "data": { "data": null, "metadata": { "deletion_time": "x" } } });
        assert!(matches!(unwrap_kv_payload(body, "m"), Err(SecretsError::NotFound { .. })));
    }

    #[test]
    fn test_select_value_priority() {
        let payload = json!({ "username": "bot", "token": "t", "password": "p" });
        assert_eq!(select_value(&payload, None, "m").unwrap(), "p");

        let payload = json!({ "value": "v", "secret": "s" });
        assert_eq!(select_value(&payload, None, "m").unwrap(), "v");
    }

    #[test]
    fn test_select_value_falls_back_to_first_string() {
        let payload = json!({ "count": 3, "api_token": "  tok  " });
        assert_eq!(select_value(&payload, None, "m").unwrap(), "tok");
    }

    #[test]
    fn test_select_value_fallback_follows_payload_order() {
        let payload: Value =
            serde_json::from_str(r#"{ "zeta": "z-first", "alpha": "a-second" }"#).unwrap();
        assert_eq!(select_value(&payload, None, "m").unwrap(), "z-first");

        let payload = json!({ "refresh": "r", "client_id": "c" });
        assert_eq!(select_value(&payload, None, "m").unwrap(), "r");
    }

    #[test]
    fn test_select_value_explicit_field() {
        let payload = json!({ "token": "t", "client_secret": "cs" });
        assert_eq!(select_value(&payload, Some("client_secret"), "m").unwrap(), "cs");
        assert!(matches!(
            select_value(&payload, Some("missing"), "m"),
            Err(SecretsError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_select_value_plain_string_and_empty() {
        assert_eq!(select_value(&json!("raw\n"), None, "m").unwrap(), "raw");
        assert!(matches!(select_value(&json!("  "), None, "m"), Err(SecretsError::EmptySecret { .. })));
        assert!(select_value(&json!({ "n": 1 }), None, "m").is_err());
    }

    #[tokio::test]
    async fn test_initialize_requires_token() {
        let provider =
            VaultSecretProvider::new(VaultProviderConfig::default(), RetryPolicy::default()).unwrap();
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, SecretsError::ProviderInitialization { .. }));

        let provider = VaultSecretProvider::new(
            VaultProviderConfig { token: Some("s.token".into()), ..Default::default() },
            RetryPolicy::default(),
        )
        .unwrap();
        assert!(provider.initialize().await.is_ok());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let config = VaultProviderConfig { address: "not a url".into(), ..Default::default() };
        assert!(matches!(
            VaultSecretProvider::new(config, RetryPolicy::default()),
            Err(SecretsError::ProviderInitialization { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let provider = VaultSecretProvider::new(
            VaultProviderConfig { token: Some("s.very-secret".into()), ..Default::default() },
            RetryPolicy::default(),
        )
        .unwrap();
        assert!(!format!("{:?}", provider).contains("very-secret"));
    }

    #[test]
    fn test_url_for_pinned_version() {
        let provider = VaultSecretProvider::new(
            VaultProviderConfig { address: "http://127.0.0.1:8200".into(), ..Default::default() },
            RetryPolicy::default(),
        )
        .unwrap();
        let reference = VaultReference::parse("vault://vault:8200/secret/data/bot?version=7").unwrap();
        assert_eq!(provider.url_for(&reference), "http://vault:8200/v1/secret/data/bot?version=7");
    }
}
