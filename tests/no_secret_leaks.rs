//! Secret values and unmasked sources must never reach log output.

mod common;

use common::{file_source, initialized_manager, test_secrets_config, write_secret, ScriptedProvider};
use herald::secrets::{RotationConfig, RotationDetector};
use tracing_test::traced_test;

const VALUE_A: &str = "leak-canary-alpha-7f3a";
const VALUE_B: &str = "leak-canary-bravo-91c2";

#[tokio::test]
#[traced_test]
async fn test_resolution_logs_are_masked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_secret(dir.path(), "hidden_token_name", VALUE_A);
    let source = file_source(&path);

    let manager = initialized_manager(test_secrets_config()).await;
    manager.resolve(&source).await.unwrap();
    manager.resolve(&source).await.unwrap();

    assert!(logs_contain("Resolved secret"));
    assert!(logs_contain("/***"));
    assert!(!logs_contain(VALUE_A));
    assert!(!logs_contain("hidden_token_name"));
}

#[tokio::test]
#[traced_test]
async fn test_failure_logs_are_masked() {
    let dir = tempfile::tempdir().unwrap();
    let manager = initialized_manager(test_secrets_config()).await;

    let missing = dir.path().join("missing_secret_name");
    let err = manager.resolve(&file_source(&missing)).await.unwrap_err();

    assert!(!err.to_string().contains("missing_secret_name"));
    assert!(logs_contain("Failed to resolve secret"));
    assert!(!logs_contain("missing_secret_name"));
}

#[tokio::test]
#[traced_test]
async fn test_rotation_logs_are_masked() {
    let manager = initialized_manager(test_secrets_config()).await;
    let provider = ScriptedProvider::new(Some(VALUE_A));
    manager.register_provider(provider.clone()).await.unwrap();

    let detector = RotationDetector::new(
        RotationConfig { enabled: true, ..Default::default() },
        manager,
    );
    detector.track_secret("mock://bot/rotating_token_name", None, None).await;
    detector.check_rotations().await;

    provider.set(Some(VALUE_B));
    assert_eq!(detector.check_rotations().await.rotated, 1);

    assert!(logs_contain("Secret rotation detected"));
    assert!(logs_contain("mock://bot/***"));
    assert!(!logs_contain(VALUE_A));
    assert!(!logs_contain(VALUE_B));
    assert!(!logs_contain("rotating_token_name"));
}
