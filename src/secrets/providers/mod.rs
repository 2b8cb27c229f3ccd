//! Pluggable secret providers
//!
//! Each provider resolves one class of secret source, selected by scheme:
//!
//! - **File**: `file://<path>`
//! - **Vault**: `vault://<host>[:port]/<path>[?version=N]`
//! - **Cloud**: `cloud://<secret-id>[?key=<field>&region=<region>]` (AWS Secrets
//!   Manager, optional `aws` feature)
//!
//! [`resolve_with_retry`] wraps every provider call with the provider's
//! [`RetryPolicy`].

#[cfg(feature = "aws")]
pub mod aws;
pub mod cloud;
pub mod file;
pub mod provider;
pub mod retry;
pub mod vault;

#[cfg(feature = "aws")]
pub use aws::AwsSecretsClient;
pub use cloud::{CloudProviderConfig, CloudSecretProvider, CloudSecretsClient};
pub use file::{FileProviderConfig, FileSecretProvider};
pub use provider::SecretProvider;
pub use retry::{resolve_with_retry, RetryPolicy};
pub use vault::{VaultProviderConfig, VaultSecretProvider};
