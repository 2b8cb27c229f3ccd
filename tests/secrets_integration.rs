//! End-to-end resolution through the secret manager with the file provider.

mod common;

use common::{file_source, initialized_manager, test_secrets_config, write_secret, ScriptedProvider};
use herald::secrets::{CacheConfigUpdate, ResolveOptions, SecretManager, SecretsError};
use std::time::Duration;

#[tokio::test]
async fn test_file_secret_trimmed_and_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_secret(dir.path(), "token", "  my-secret-value\n");
    let source = file_source(&path);

    let manager = initialized_manager(test_secrets_config()).await;

    let first = manager.resolve(&source).await.unwrap();
    assert_eq!(first.value.expose_secret(), "my-secret-value");
    assert!(!first.cached);
    assert_eq!(first.metadata.provider_name, "file");
    assert_eq!(first.metadata.source, source);

    let second = manager.resolve(&source).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.value, first.value);

    let stats = manager.get_cache_stats().await;
    assert_eq!(stats.size, 1);
    assert_eq!(stats.total_access_count, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_empty_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_secret(dir.path(), "empty", " \n\t\n");

    let manager = initialized_manager(test_secrets_config()).await;
    let err = manager.resolve(&file_source(&path)).await.unwrap_err();

    assert!(matches!(err, SecretsError::ResolutionFailed { attempts: 1, .. }));
    assert!(matches!(err.root_cause(), SecretsError::EmptySecret { .. }), "unexpected error: {}", err);
    assert_eq!(manager.get_cache_stats().await.size, 0);
}

#[tokio::test]
async fn test_file_error_kinds_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let manager = initialized_manager(test_secrets_config()).await;

    let missing = manager.resolve(&file_source(&dir.path().join("missing"))).await.unwrap_err();
    assert!(matches!(missing.root_cause(), SecretsError::NotFound { .. }), "unexpected error: {}", missing);

    let directory = manager.resolve(&file_source(dir.path())).await.unwrap_err();
    assert!(matches!(
        directory,
        SecretsError::ResolutionFailed { ref cause, attempts: 1, .. } if matches!(**cause, SecretsError::IsDirectory { .. })
    ));
}

#[tokio::test]
async fn test_relative_paths_use_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_secret(dir.path(), "api_key", "key-123\n");

    let mut config = test_secrets_config();
    config.providers.file.base_dir = Some(dir.path().to_path_buf());
    let manager = initialized_manager(config).await;

    let result = manager.resolve("file://api_key").await.unwrap();
    assert_eq!(result.value.expose_secret(), "key-123");
}

#[tokio::test]
async fn test_unsupported_scheme() {
    let manager = initialized_manager(test_secrets_config()).await;
    let err = manager.resolve("unsupported://x").await.unwrap_err();
    assert!(matches!(err, SecretsError::NoProviderFound { .. }));
    assert_eq!(manager.get_cache_stats().await.size, 0);
}

#[tokio::test]
async fn test_not_initialized() {
    let manager = SecretManager::new(test_secrets_config());
    assert!(matches!(manager.resolve("file:///x").await, Err(SecretsError::NotInitialized)));
}

#[tokio::test]
async fn test_concurrent_resolves_of_same_source() {
    let manager = initialized_manager(test_secrets_config()).await;
    let provider = ScriptedProvider::new(Some("shared"));
    manager.register_provider(provider.clone()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.resolve("mock://bot/token").await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.value.expose_secret(), "shared");
    }

    // duplicated in-flight work is tolerated, but there is one cache entry
    assert!(provider.calls() >= 1);
    assert_eq!(manager.get_cache_stats().await.size, 1);
}

#[tokio::test]
async fn test_retries_exhausted_reports_attempts() {
    let manager = initialized_manager(test_secrets_config()).await;
    let provider = ScriptedProvider::new(None);
    manager.register_provider(provider.clone()).await.unwrap();

    let err = manager.resolve("mock://broken").await.unwrap_err();
    match err {
        SecretsError::ResolutionFailed { provider: name, attempts, .. } => {
            assert_eq!(name, "scripted");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_cache_ttl_update_applies_live() {
    let manager = initialized_manager(test_secrets_config()).await;
    let provider = ScriptedProvider::new(Some("v1"));
    manager.register_provider(provider.clone()).await.unwrap();

    manager.resolve("mock://a").await.unwrap();
    manager
        .update_cache_config(CacheConfigUpdate {
            ttl: Some(Duration::from_millis(50)),
            ..Default::default()
        })
        .await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    provider.set(Some("v2"));
    let result = manager.resolve("mock://a").await.unwrap();
    assert!(!result.cached);
    assert_eq!(result.value.expose_secret(), "v2");
}

#[tokio::test]
async fn test_bypass_cache_sees_new_value() {
    let manager = initialized_manager(test_secrets_config()).await;
    let provider = ScriptedProvider::new(Some("old"));
    manager.register_provider(provider.clone()).await.unwrap();

    manager.resolve("mock://a").await.unwrap();
    provider.set(Some("new"));

    assert_eq!(manager.resolve("mock://a").await.unwrap().value.expose_secret(), "old");
    let fresh = manager.resolve_with("mock://a", ResolveOptions::bypass_cache()).await.unwrap();
    assert_eq!(fresh.value.expose_secret(), "new");
}
