//! AWS Secrets Manager client for the cloud provider (`aws` feature).

use super::cloud::{CloudProviderConfig, CloudSecretsClient};
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::mask::mask_source;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_secretsmanager::error::ProvideErrorMetadata;
use aws_sdk_secretsmanager::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Secrets Manager client with lazily created per-region clients.
#[derive(Debug)]
pub struct AwsSecretsClient {
    sdk_config: aws_config::SdkConfig,
    default_client: Client,
    regional: Mutex<HashMap<String, Client>>,
}

impl AwsSecretsClient {
    /// Load AWS configuration (explicit settings first, then the ambient
    /// environment) and build the default client. No request is sent.
    pub async fn connect(config: &CloudProviderConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(
            aws_config::timeout::TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(config.timeout_ms))
                .build(),
        );

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(aws_sdk_secretsmanager::config::Credentials::new(
                key_id.clone(),
                secret.expose_secret().to_string(),
                None,
                None,
                "herald-config",
            ));
        }

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        let default_client = Client::new(&sdk_config);

        info!(region = ?sdk_config.region().map(|r| r.to_string()), "Initialized AWS Secrets Manager client");

        Ok(Self { sdk_config, default_client, regional: Mutex::new(HashMap::new()) })
    }

    async fn client_for(&self, region: Option<&str>) -> Client {
        let Some(region) = region else {
            return self.default_client.clone();
        };
        if self.sdk_config.region().map(|r| r.as_ref()) == Some(region) {
            return self.default_client.clone();
        }

        let mut regional = self.regional.lock().await;
        regional
            .entry(region.to_string())
            .or_insert_with(|| {
                debug!(region = %region, "Creating regional Secrets Manager client");
                let conf = aws_sdk_secretsmanager::config::Builder::from(&self.sdk_config)
                    .region(Region::new(region.to_string()))
                    .build();
                Client::from_conf(conf)
            })
            .clone()
    }
}

#[async_trait]
impl CloudSecretsClient for AwsSecretsClient {
    async fn get_secret_string(&self, secret_id: &str, region: Option<&str>) -> Result<String> {
        let masked = mask_source(secret_id);
        let client = self.client_for(region).await;

        let output = client.get_secret_value().secret_id(secret_id).send().await.map_err(|e| {
            let service_error = e.into_service_error();
            if service_error.is_resource_not_found_exception() {
                return SecretsError::not_found(&masked);
            }
            match service_error.code() {
                Some("AccessDeniedException") => SecretsError::permission_denied(&masked),
                Some(code) => SecretsError::backend_error(format!(
                    "Secrets Manager returned {} for '{}'",
                    code, masked
                )),
                None => SecretsError::Http("request error".to_string()),
            }
        })?;

        if let Some(value) = output.secret_string() {
            return Ok(value.to_string());
        }

        match output.secret_binary() {
            Some(blob) => String::from_utf8(blob.as_ref().to_vec()).map_err(|_| {
                SecretsError::backend_error(format!("binary secret '{}' is not UTF-8", masked))
            }),
            None => Err(SecretsError::empty_secret(&masked)),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.default_client.list_secrets().max_results(1).send().await.map_err(|e| {
            SecretsError::backend_error(format!(
                "Secrets Manager health check failed: {}",
                e.into_service_error().code().unwrap_or("unknown error")
            ))
        })?;
        Ok(())
    }
}
