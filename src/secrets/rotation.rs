//! Rotation detection
//!
//! A background poller that re-resolves tracked sources on a cron schedule,
//! bypassing the cache, and raises a [`RotationEvent`] when a value differs from
//! the last one observed. The first successful check of a source only records
//! a baseline.
//!
//! Checks within a cycle run one after another so a single secret store never
//! sees more than one request from the detector at a time. Failed checks may
//! schedule a deferred retry; pending retries are cancelled by
//! [`RotationDetector::stop`].

use super::error::{Result, SecretsError};
use super::manager::SecretManager;
use super::mask::mask_source;
use super::types::{ResolveOptions, SecretString};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use validator::Validate;

const EVENT_CHANNEL_CAPACITY: usize = 64;

fn default_check_interval() -> String {
    "*/15 * * * *".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_delay_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

/// Rotation detection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RotationConfig {
    /// Enable rotation detection
    #[serde(default)]
    pub enabled: bool,

    /// Cron expression; 5 fields (minute precision) or 6/7 fields (seconds)
    #[serde(default = "default_check_interval")]
    #[validate(length(min = 1, message = "Rotation check interval cannot be empty"))]
    pub check_interval: String,

    /// Schedule a deferred retry after a failed check
    #[serde(default = "default_true")]
    pub retry_on_failure: bool,

    /// Delay before a deferred retry
    #[serde(default = "default_retry_delay_seconds")]
    #[validate(range(max = 86400, message = "Retry delay must be at most one day"))]
    pub retry_delay_seconds: u64,

    /// Consecutive deferred retries allowed before waiting for the next cycle
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 100, message = "max_retries must be at most 100"))]
    pub max_retries: u32,

    /// Publish rotation events to subscribers
    #[serde(default = "default_true")]
    pub notify_on_rotation: bool,

    /// Run the connection tester against rotated credentials
    #[serde(default)]
    pub test_connection_on_rotation: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: default_check_interval(),
            retry_on_failure: true,
            retry_delay_seconds: default_retry_delay_seconds(),
            max_retries: default_max_retries(),
            notify_on_rotation: true,
            test_connection_on_rotation: false,
        }
    }
}

impl RotationConfig {
    /// Get retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

/// Parse a check interval, prepending a seconds field to 5-field expressions
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => {
            return Err(SecretsError::invalid_schedule(
                expression,
                format!("expected 5, 6 or 7 fields, found {}", n),
            ))
        }
    };

    Schedule::from_str(&normalized)
        .map_err(|e| SecretsError::invalid_schedule(expression, e.to_string()))
}

/// A source under rotation monitoring
#[derive(Debug, Clone)]
pub struct TrackedSecret {
    pub source: String,
    pub account_name: Option<String>,
    pub field_name: Option<String>,
    /// `None` until the first successful check records a baseline
    pub last_value: Option<SecretString>,
    pub last_checked: Option<DateTime<Utc>>,
    pub rotation_count: u64,
    pub last_rotation_detected: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl TrackedSecret {
    fn new(source: String, account_name: Option<String>, field_name: Option<String>) -> Self {
        Self {
            source,
            account_name,
            field_name,
            last_value: None,
            last_checked: None,
            rotation_count: 0,
            last_rotation_detected: None,
            retry_count: 0,
        }
    }

    fn view(&self) -> TrackedSecretView {
        TrackedSecretView {
            source: mask_source(&self.source),
            account_name: self.account_name.clone(),
            field_name: self.field_name.clone(),
            baselined: self.last_value.is_some(),
            last_checked: self.last_checked,
            rotation_count: self.rotation_count,
            last_rotation_detected: self.last_rotation_detected,
            retry_count: self.retry_count,
        }
    }
}

/// Status view of a tracked secret: masked source, no values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedSecretView {
    pub source: String,
    pub account_name: Option<String>,
    pub field_name: Option<String>,
    pub baselined: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub rotation_count: u64,
    pub last_rotation_detected: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// A detected change in a tracked secret's value
#[derive(Debug, Clone)]
pub struct RotationEvent {
    pub source: String,
    pub provider_name: String,
    pub old_value: SecretString,
    pub new_value: SecretString,
    pub detected_at: DateTime<Utc>,
    pub account_name: Option<String>,
    pub field_name: Option<String>,
}

/// Verifies a rotated credential against the service that consumes it
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    /// Return `true` if a connection using `event.new_value` works.
    async fn test_connection(&self, event: &RotationEvent) -> bool;
}

/// Outcome counts of one [`RotationDetector::check_rotations`] cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub checked: usize,
    pub rotated: usize,
    pub failed: usize,
    pub baselined: usize,
}

/// Detector statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationStats {
    pub enabled: bool,
    pub running: bool,
    pub tracked: usize,
    pub total_rotations: u64,
    pub total_checks: u64,
    pub last_check_at: Option<DateTime<Utc>>,
    pub check_interval: String,
    pub pending_retries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Baselined,
    Unchanged,
    Rotated,
    Failed { retry: bool },
    Untracked,
}

struct Running {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

struct Inner {
    config: RotationConfig,
    manager: Arc<SecretManager>,
    tracked: Mutex<BTreeMap<String, TrackedSecret>>,
    events: broadcast::Sender<RotationEvent>,
    tester: RwLock<Option<Arc<dyn ConnectionTester>>>,
    running: Mutex<Option<Running>>,
    retry_token: Mutex<CancellationToken>,
    pending_retries: AtomicUsize,
    total_rotations: AtomicU64,
    total_checks: AtomicU64,
    last_check_at: Mutex<Option<DateTime<Utc>>>,
}

/// Polls tracked secrets for value changes
///
/// Cloning shares the same detector.
#[derive(Clone)]
pub struct RotationDetector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RotationDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationDetector")
            .field("enabled", &self.inner.config.enabled)
            .field("check_interval", &self.inner.config.check_interval)
            .finish()
    }
}

impl RotationDetector {
    /// Create a detector that resolves through `manager`
    pub fn new(config: RotationConfig, manager: Arc<SecretManager>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                manager,
                tracked: Mutex::new(BTreeMap::new()),
                events,
                tester: RwLock::new(None),
                running: Mutex::new(None),
                retry_token: Mutex::new(CancellationToken::new()),
                pending_retries: AtomicUsize::new(0),
                total_rotations: AtomicU64::new(0),
                total_checks: AtomicU64::new(0),
                last_check_at: Mutex::new(None),
            }),
        }
    }

    /// Attach the collaborator used when `test_connection_on_rotation` is set
    pub async fn set_connection_tester(&self, tester: Arc<dyn ConnectionTester>) {
        *self.inner.tester.write().await = Some(tester);
    }

    /// Receive rotation events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.inner.events.subscribe()
    }

    /// Start the check schedule
    ///
    /// No-op when detection is disabled or already running. Fails only if the
    /// check interval is not a valid cron expression.
    pub async fn start(&self) -> Result<()> {
        let config = &self.inner.config;
        if !config.enabled {
            info!("Rotation detection disabled");
            return Ok(());
        }

        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            debug!("Rotation detector already running");
            return Ok(());
        }

        let schedule = parse_schedule(&config.check_interval)?;
        {
            let mut retry_token = self.inner.retry_token.lock().await;
            if retry_token.is_cancelled() {
                *retry_token = CancellationToken::new();
            }
        }

        let token = CancellationToken::new();
        let detector = self.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { detector.run_schedule(schedule, loop_token).await });

        *running = Some(Running { token, _handle: handle });
        info!(check_interval = %config.check_interval, "Started rotation detector");
        Ok(())
    }

    /// Stop the schedule and cancel pending retries
    ///
    /// A cycle already in progress runs to completion but schedules no
    /// retries. Retries stay disabled until the next [`RotationDetector::start`].
    pub async fn stop(&self) {
        let running = self.inner.running.lock().await.take();
        self.inner.retry_token.lock().await.cancel();

        if let Some(running) = running {
            running.token.cancel();
            info!("Stopped rotation detector");
        }
    }

    /// Whether the schedule is active
    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    async fn run_schedule(self, schedule: Schedule, token: CancellationToken) {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Rotation schedule has no upcoming runs; stopping loop");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let summary = self.check_rotations().await;
            debug!(?summary, next_run = ?schedule.upcoming(Utc).next(), "Scheduled rotation check finished");
        }
        debug!("Rotation schedule loop exited");
    }

    /// Start monitoring a source, replacing any existing entry
    ///
    /// No-op when detection is disabled.
    pub async fn track_secret(
        &self,
        source: impl Into<String>,
        account_name: Option<String>,
        field_name: Option<String>,
    ) {
        let source = source.into();
        if !self.inner.config.enabled {
            debug!(source = %mask_source(&source), "Rotation detection disabled; not tracking");
            return;
        }

        debug!(source = %mask_source(&source), account = ?account_name, "Tracking secret for rotation");
        self.inner
            .tracked
            .lock()
            .await
            .insert(source.clone(), TrackedSecret::new(source, account_name, field_name));
    }

    /// Stop monitoring a source
    pub async fn untrack_secret(&self, source: &str) -> bool {
        let removed = self.inner.tracked.lock().await.remove(source).is_some();
        if removed {
            debug!(source = %mask_source(source), "Untracked secret");
        }
        removed
    }

    /// Check every tracked source once, in order
    ///
    /// Failures are logged per source and never abort the cycle.
    pub async fn check_rotations(&self) -> CheckSummary {
        let sources: Vec<String> = self.inner.tracked.lock().await.keys().cloned().collect();
        let mut summary = CheckSummary::default();

        if sources.is_empty() {
            debug!("No secrets tracked for rotation; skipping check");
            return summary;
        }

        self.inner.total_checks.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_check_at.lock().await = Some(Utc::now());

        for source in sources {
            match self.check_secret(&source).await {
                CheckOutcome::Baselined => summary.baselined += 1,
                CheckOutcome::Unchanged => {}
                CheckOutcome::Rotated => summary.rotated += 1,
                CheckOutcome::Failed { retry } => {
                    summary.failed += 1;
                    if retry {
                        self.schedule_retry(source.clone()).await;
                    }
                }
                CheckOutcome::Untracked => continue,
            }
            summary.checked += 1;
        }

        info!(
            checked = summary.checked,
            rotated = summary.rotated,
            failed = summary.failed,
            baselined = summary.baselined,
            "Rotation check complete"
        );
        summary
    }

    async fn check_secret(&self, source: &str) -> CheckOutcome {
        let masked = mask_source(source);
        let resolved = self.inner.manager.resolve_with(source, ResolveOptions::bypass_cache()).await;

        let mut tracked = self.inner.tracked.lock().await;
        let Some(entry) = tracked.get_mut(source) else {
            return CheckOutcome::Untracked;
        };
        entry.last_checked = Some(Utc::now());

        let result = match resolved {
            Ok(result) => result,
            Err(e) => {
                metrics::record_rotation_check_failure();
                let config = &self.inner.config;
                let retry = config.retry_on_failure && entry.retry_count < config.max_retries;
                if retry {
                    entry.retry_count += 1;
                }
                warn!(
                    source = %masked,
                    error = %e,
                    retry_count = entry.retry_count,
                    will_retry = retry,
                    "Rotation check failed"
                );
                return CheckOutcome::Failed { retry };
            }
        };

        entry.retry_count = 0;
        let Some(old_value) = entry.last_value.replace(result.value.clone()) else {
            debug!(source = %masked, "Recorded rotation baseline");
            return CheckOutcome::Baselined;
        };

        if old_value == result.value {
            return CheckOutcome::Unchanged;
        }

        let detected_at = Utc::now();
        entry.rotation_count += 1;
        entry.last_rotation_detected = Some(detected_at);
        let event = RotationEvent {
            source: source.to_string(),
            provider_name: result.metadata.provider_name.clone(),
            old_value,
            new_value: result.value,
            detected_at,
            account_name: entry.account_name.clone(),
            field_name: entry.field_name.clone(),
        };
        let rotation_count = entry.rotation_count;
        drop(tracked);

        info!(
            source = %masked,
            provider = %event.provider_name,
            account = ?event.account_name,
            rotation_count,
            "Secret rotation detected"
        );
        self.handle_rotation(event).await;
        CheckOutcome::Rotated
    }

    async fn handle_rotation(&self, event: RotationEvent) {
        let config = &self.inner.config;
        self.inner.total_rotations.fetch_add(1, Ordering::Relaxed);
        metrics::record_rotation(&event.provider_name);

        self.inner.manager.clear_cache(Some(&event.source)).await;

        if config.test_connection_on_rotation {
            let tester = self.inner.tester.read().await.clone();
            match tester {
                Some(tester) => {
                    let masked = mask_source(&event.source);
                    if tester.test_connection(&event).await {
                        info!(source = %masked, "Connection test with rotated secret succeeded");
                    } else {
                        warn!(source = %masked, "Connection test with rotated secret failed");
                    }
                }
                None => debug!("No connection tester attached; skipping post-rotation test"),
            }
        }

        if config.notify_on_rotation && self.inner.events.send(event).is_err() {
            debug!("No rotation event subscribers");
        }
    }

    /// Re-check one source after the retry delay until it succeeds, runs out
    /// of retries, or the detector is stopped.
    async fn schedule_retry(&self, source: String) {
        let token = self.inner.retry_token.lock().await.clone();
        if token.is_cancelled() {
            debug!(source = %mask_source(&source), "Detector stopped; not scheduling rotation retry");
            return;
        }
        let delay = self.inner.config.retry_delay();
        let detector = self.clone();

        self.inner.pending_retries.fetch_add(1, Ordering::SeqCst);
        debug!(source = %mask_source(&source), delay_secs = delay.as_secs(), "Scheduled rotation check retry");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(source = %mask_source(&source), "Cancelled pending rotation retry");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                match detector.check_secret(&source).await {
                    CheckOutcome::Failed { retry: true } => continue,
                    _ => break,
                }
            }
            detector.inner.pending_retries.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Detector statistics
    pub async fn get_stats(&self) -> RotationStats {
        RotationStats {
            enabled: self.inner.config.enabled,
            running: self.is_running().await,
            tracked: self.inner.tracked.lock().await.len(),
            total_rotations: self.inner.total_rotations.load(Ordering::Relaxed),
            total_checks: self.inner.total_checks.load(Ordering::Relaxed),
            last_check_at: *self.inner.last_check_at.lock().await,
            check_interval: self.inner.config.check_interval.clone(),
            pending_retries: self.inner.pending_retries.load(Ordering::SeqCst),
        }
    }

    /// Tracked secrets with masked sources and no values
    pub async fn get_tracked_secrets(&self) -> Vec<TrackedSecretView> {
        self.inner.tracked.lock().await.values().map(TrackedSecret::view).collect()
    }
}
