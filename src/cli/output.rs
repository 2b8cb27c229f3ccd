//! Shared output formatting utilities for CLI commands
//!
//! Everything printed here has already been masked; values never reach this
//! module.

use crate::secrets::{CacheStats, RotationEvent, SecretResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

/// Printable summary of a resolution
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedSummary {
    pub source: String,
    pub provider: String,
    pub cached: bool,
    pub length: usize,
    pub resolved_at: DateTime<Utc>,
    pub access_count: u64,
}

impl ResolvedSummary {
    pub fn new(masked_source: String, result: &SecretResult) -> Self {
        Self {
            source: masked_source,
            provider: result.metadata.provider_name.clone(),
            cached: result.cached,
            length: result.value.len(),
            resolved_at: result.metadata.resolved_at,
            access_count: result.metadata.access_count,
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print a horizontal separator line
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print key/value rows with the keys padded to a common width
pub fn print_rows(rows: &[(&str, String)]) {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        println!("{:<width$}  {}", key, value, width = width);
    }
}

pub fn print_resolved(summary: &ResolvedSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            print_rows(&[
                ("source", summary.source.clone()),
                ("provider", summary.provider.clone()),
                ("cached", summary.cached.to_string()),
                ("length", summary.length.to_string()),
                ("resolved_at", summary.resolved_at.to_rfc3339()),
                ("access_count", summary.access_count.to_string()),
            ]);
            Ok(())
        }
    }
}

pub fn print_connections(results: &BTreeMap<String, bool>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(results),
        OutputFormat::Table => {
            if results.is_empty() {
                println!("No secret providers registered");
                return Ok(());
            }
            println!("{:<16} STATUS", "PROVIDER");
            print_separator(24);
            for (provider, healthy) in results {
                println!("{:<16} {}", provider, if *healthy { "ok" } else { "unreachable" });
            }
            Ok(())
        }
    }
}

pub fn print_cache_stats(stats: &CacheStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(stats),
        OutputFormat::Table => {
            print_rows(&[
                ("enabled", stats.enabled.to_string()),
                ("ttl_seconds", stats.ttl_seconds.to_string()),
                ("size", format!("{}/{}", stats.size, stats.max_size)),
                ("total_access_count", stats.total_access_count.to_string()),
                ("hits", stats.hits.to_string()),
                ("misses", stats.misses.to_string()),
            ]);
            Ok(())
        }
    }
}

/// One line per rotation event, masked
pub fn format_rotation(event: &RotationEvent) -> String {
    let mut line = format!(
        "{} rotated {} (provider: {})",
        event.detected_at.to_rfc3339(),
        crate::secrets::mask_source(&event.source),
        event.provider_name
    );
    if let Some(account) = &event.account_name {
        line.push_str(&format!(" account: {}", account));
    }
    line
}
