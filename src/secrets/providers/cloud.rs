//! Cloud secret manager provider
//!
//! Resolves `cloud://<secret-name-or-arn>[?key=<field>&region=<region>]`
//! (alias `aws-sm://`) through a [`CloudSecretsClient`]. The production client
//! is AWS Secrets Manager (`aws` feature); without the feature the provider is
//! not registered by the manager.
//!
//! ## Configuration
//!
//! Region and credentials come from the `[secrets.providers.cloud]` table when
//! present, otherwise from the ambient AWS environment (`AWS_REGION`,
//! `AWS_ACCESS_KEY_ID`, instance profile, ...).

use super::provider::{strip_scheme, SecretProvider};
use super::retry::RetryPolicy;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::mask::mask_source;
use crate::secrets::types::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Primary scheme handled by [`CloudSecretProvider`]
pub const CLOUD_SCHEME: &str = "cloud";

/// Alternative scheme naming the backing service explicitly
pub const AWS_SM_SCHEME: &str = "aws-sm";

fn default_timeout_ms() -> u64 {
    10_000
}

/// Configuration for the cloud provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudProviderConfig {
    /// Default region; per-source `region=` and ARN regions take precedence
    #[serde(default)]
    pub region: Option<String>,

    /// Static access key id (ambient credentials when absent)
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret access key, required together with `access_key_id`
    #[serde(default)]
    pub secret_access_key: Option<SecretString>,

    /// Custom endpoint (e.g. LocalStack)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Operation timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry policy override (falls back to the shared provider policy)
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl CloudProviderConfig {
    /// Load configuration from environment variables
    ///
    /// Uses `HERALD_CLOUD_REGION` (or `AWS_REGION`) and
    /// `HERALD_CLOUD_ENDPOINT_URL`. Returns `None` when neither a region nor an
    /// endpoint is configured.
    pub fn from_env() -> Option<Self> {
        let region =
            std::env::var("HERALD_CLOUD_REGION").or_else(|_| std::env::var("AWS_REGION")).ok();
        let endpoint_url = std::env::var("HERALD_CLOUD_ENDPOINT_URL").ok();

        if region.is_none() && endpoint_url.is_none() {
            return None;
        }

        Some(Self { region, endpoint_url, timeout_ms: default_timeout_ms(), ..Self::default() })
    }

    fn validate_credentials(&self) -> Result<()> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => Err(SecretsError::provider_initialization(
                "cloud",
                "access_key_id and secret_access_key must be set together",
            )),
            _ => Ok(()),
        }
    }
}

/// Minimal interface to a cloud secret store.
#[async_trait]
pub trait CloudSecretsClient: Send + Sync + std::fmt::Debug {
    /// Fetch the current string payload of `secret_id`.
    async fn get_secret_string(&self, secret_id: &str, region: Option<&str>) -> Result<String>;

    /// Cheap authenticated call used for liveness checks.
    async fn ping(&self) -> Result<()>;
}

/// A parsed `cloud://` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CloudReference {
    pub secret_id: String,
    pub key: Option<String>,
    pub region: Option<String>,
}

impl CloudReference {
    pub(crate) fn parse(source: &str) -> Result<Self> {
        let masked = mask_source(source);
        let rest = strip_scheme(source, CLOUD_SCHEME)
            .or_else(|| strip_scheme(source, AWS_SM_SCHEME))
            .ok_or_else(|| SecretsError::invalid_source(&masked, "expected cloud://<secret-id>"))?;

        let (secret_id, query) = match rest.split_once('?') {
            Some((id, query)) => (id, Some(query)),
            None => (rest, None),
        };

        if secret_id.trim().is_empty() {
            return Err(SecretsError::invalid_source(&masked, "missing secret id"));
        }

        let mut key = None;
        let mut region = None;
        if let Some(query) = query {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match name.as_ref() {
                    "key" => key = Some(value.into_owned()),
                    "region" => region = Some(value.into_owned()),
                    other => {
                        debug!(source = %masked, parameter = %other, "Ignoring unknown cloud parameter")
                    }
                }
            }
        }

        // arn:aws:secretsmanager:<region>:<account>:secret:<name>
        if region.is_none() && secret_id.starts_with("arn:") {
            region = secret_id.split(':').nth(3).filter(|r| !r.is_empty()).map(String::from);
        }

        Ok(Self { secret_id: secret_id.to_string(), key, region })
    }
}

/// Extract `key` from a structured payload, or return the payload as-is.
pub(crate) fn extract_field(payload: &str, key: Option<&str>, masked: &str) -> Result<String> {
    let value = match key {
        None => payload.to_string(),
        Some(key) => {
            let parsed: Value = serde_json::from_str(payload).map_err(|_| {
                SecretsError::backend_error(format!(
                    "secret '{}' is not a JSON object; cannot extract field '{}'",
                    masked, key
                ))
            })?;
            match parsed.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => return Err(SecretsError::field_not_found(masked, key)),
            }
        }
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SecretsError::empty_secret(masked));
    }
    Ok(trimmed.to_string())
}

/// Cloud secret manager provider
#[derive(Debug)]
pub struct CloudSecretProvider {
    config: CloudProviderConfig,
    client: RwLock<Option<Arc<dyn CloudSecretsClient>>>,
    retry: RetryPolicy,
}

impl CloudSecretProvider {
    /// Whether this build ships a production cloud client.
    pub fn is_available() -> bool {
        cfg!(feature = "aws")
    }

    /// Create a provider whose client is built during `initialize`.
    pub fn new(config: CloudProviderConfig, default_retry: RetryPolicy) -> Self {
        let retry = config.retry.unwrap_or(default_retry);
        Self { config, client: RwLock::new(None), retry }
    }

    /// Create a provider around an existing client.
    pub fn with_client(
        config: CloudProviderConfig,
        default_retry: RetryPolicy,
        client: Arc<dyn CloudSecretsClient>,
    ) -> Self {
        let retry = config.retry.unwrap_or(default_retry);
        Self { config, client: RwLock::new(Some(client)), retry }
    }

    async fn client(&self) -> Result<Arc<dyn CloudSecretsClient>> {
        self.client.read().await.clone().ok_or_else(|| {
            SecretsError::provider_initialization("cloud", "client is not initialized")
        })
    }

    #[cfg(feature = "aws")]
    async fn build_client(&self) -> Result<Arc<dyn CloudSecretsClient>> {
        let client = super::aws::AwsSecretsClient::connect(&self.config).await?;
        Ok(Arc::new(client))
    }

    #[cfg(not(feature = "aws"))]
    async fn build_client(&self) -> Result<Arc<dyn CloudSecretsClient>> {
        Err(SecretsError::provider_initialization(
            "cloud",
            "built without the `aws` feature; no cloud client available",
        ))
    }
}

#[async_trait]
impl SecretProvider for CloudSecretProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn initialize(&self) -> Result<()> {
        self.config.validate_credentials()?;

        let mut guard = self.client.write().await;
        if guard.is_none() {
            *guard = Some(self.build_client().await?);
        }

        info!(
            region = ?self.config.region,
            endpoint_url = ?self.config.endpoint_url,
            "Initialized cloud secret provider"
        );
        Ok(())
    }

    fn can_handle(&self, source: &str) -> bool {
        strip_scheme(source, CLOUD_SCHEME).is_some() || strip_scheme(source, AWS_SM_SCHEME).is_some()
    }

    async fn resolve(&self, source: &str) -> Result<String> {
        let masked = mask_source(source);
        let reference = CloudReference::parse(source)?;
        let region = reference.region.as_deref().or(self.config.region.as_deref());

        debug!(source = %masked, region = ?region, "Fetching secret from cloud secret manager");

        let payload = self.client().await?.get_secret_string(&reference.secret_id, region).await?;
        extract_field(&payload, reference.key.as_deref(), &masked)
    }

    async fn test_connection(&self) -> bool {
        let Ok(client) = self.client().await else {
            return false;
        };
        match client.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cloud secret manager health check failed");
                false
            }
        }
    }

    async fn cleanup(&self) {
        if self.client.write().await.take().is_some() {
            debug!("Released cloud secret manager client");
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}
