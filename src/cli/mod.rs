//! # Command Line Interface
//!
//! Operational commands for herald's secrets subsystem: resolve a source,
//! probe providers, inspect the cache and watch for rotations. Output is
//! masked; secret values are never printed.

pub mod output;

use crate::config::Config;
use crate::observability::{describe_metrics, init_logging, log_config_info};
use crate::secrets::{mask_source, ResolveOptions, RotationDetector, SecretManager};
use anyhow::Context;
use clap::{Parser, Subcommand};
use output::OutputFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

const DEFAULT_CONFIG_FILE: &str = "herald.toml";

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Herald secret resolution and rotation tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (defaults to ./herald.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a secret source and print its metadata (never the value)
    Resolve {
        /// Secret source, e.g. file:///run/secrets/token
        source: String,

        /// Skip the cache and always call the provider
        #[arg(long)]
        no_cache: bool,
    },

    /// Run every provider's connection test
    TestConnections,

    /// Show cache configuration and statistics
    CacheStats,

    /// Track sources and print rotation events until interrupted
    Watch {
        /// Source to track (repeatable)
        #[arg(long = "track", required = true)]
        track: Vec<String>,

        /// Override the configured check interval (cron expression)
        #[arg(long)]
        interval: Option<String>,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    let _log_guard = init_logging(&config.observability).context("Failed to initialize logging")?;
    describe_metrics();
    log_config_info(&config);

    let manager = Arc::new(SecretManager::new(config.secrets.clone()));
    manager.initialize().await.context("Failed to initialize secret providers")?;

    let outcome = run_command(cli.command, cli.output, &config, manager.clone()).await;
    manager.shutdown().await;
    outcome
}

async fn run_command(
    command: Commands,
    format: OutputFormat,
    config: &Config,
    manager: Arc<SecretManager>,
) -> anyhow::Result<()> {
    match command {
        Commands::Resolve { source, no_cache } => {
            let options = ResolveOptions { bypass_cache: no_cache };
            let masked = mask_source(&source);
            let result = manager
                .resolve_with(&source, options)
                .await
                .with_context(|| format!("Failed to resolve {}", masked))?;
            output::print_resolved(&output::ResolvedSummary::new(masked, &result), format)?;
        }

        Commands::TestConnections => {
            let results = manager.test_connections().await;
            output::print_connections(&results, format)?;
            if results.values().any(|healthy| !healthy) {
                anyhow::bail!("one or more secret providers are unreachable");
            }
        }

        Commands::CacheStats => {
            output::print_cache_stats(&manager.get_cache_stats().await, format)?;
        }

        Commands::Watch { track, interval } => watch(config, manager, track, interval).await?,
    }

    Ok(())
}

async fn watch(
    config: &Config,
    manager: Arc<SecretManager>,
    sources: Vec<String>,
    interval: Option<String>,
) -> anyhow::Result<()> {
    let mut rotation = config.secrets.rotation.clone();
    rotation.enabled = true;
    if let Some(interval) = interval {
        rotation.check_interval = interval;
    }

    let detector = RotationDetector::new(rotation, manager);
    for source in sources {
        detector.track_secret(source, None, None).await;
    }

    let mut events = detector.subscribe();
    detector.start().await.context("Failed to start rotation detector")?;

    let baseline = detector.check_rotations().await;
    println!(
        "Watching {} secret(s) on '{}' (baselined: {}, failed: {}); press Ctrl-C to stop",
        baseline.checked,
        detector.get_stats().await.check_interval,
        baseline.baselined,
        baseline.failed
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", output::format_rotation(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped rotation events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    detector.stop().await;
    for tracked in detector.get_tracked_secrets().await {
        println!("{}: {} rotation(s)", tracked.source, tracked.rotation_count);
    }
    Ok(())
}

/// Load configuration from an explicit path, `./herald.toml`, or the environment
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Config::from_file(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_FILE)),
        None => Config::from_env().context("Failed to load configuration from environment"),
    }
}
