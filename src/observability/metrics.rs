//! # Metrics Collection
//!
//! Counters emitted through the `metrics` facade. No exporter is installed
//! here; an embedding application attaches whichever recorder it uses.

use metrics::{counter, describe_counter};

pub const RESOLUTIONS_TOTAL: &str = "herald_secret_resolutions_total";
pub const CACHE_HITS_TOTAL: &str = "herald_secret_cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "herald_secret_cache_misses_total";
pub const ROTATIONS_TOTAL: &str = "herald_secret_rotations_total";
pub const ROTATION_CHECK_FAILURES_TOTAL: &str = "herald_secret_rotation_check_failures_total";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(RESOLUTIONS_TOTAL, "Provider resolutions by provider and outcome");
    describe_counter!(CACHE_HITS_TOTAL, "Secret cache lookups served from the cache");
    describe_counter!(CACHE_MISSES_TOTAL, "Secret cache lookups that fell through");
    describe_counter!(ROTATIONS_TOTAL, "Detected secret rotations");
    describe_counter!(ROTATION_CHECK_FAILURES_TOTAL, "Failed rotation checks");
}

/// Record a provider resolution outcome
pub fn record_resolution(provider: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    let labels = [("provider", provider.to_string()), ("outcome", outcome.to_string())];
    counter!(RESOLUTIONS_TOTAL, &labels).increment(1);
}

/// Record a cache lookup
pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!(CACHE_HITS_TOTAL).increment(1);
    } else {
        counter!(CACHE_MISSES_TOTAL).increment(1);
    }
}

/// Record a detected rotation
pub fn record_rotation(provider: &str) {
    let labels = [("provider", provider.to_string())];
    counter!(ROTATIONS_TOTAL, &labels).increment(1);
}

/// Record a failed rotation check
pub fn record_rotation_check_failure() {
    counter!(ROTATION_CHECK_FAILURES_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // the facade is a no-op until a recorder is installed
        describe_metrics();
        record_resolution("file", true);
        record_resolution("vault", false);
        record_cache_lookup(true);
        record_cache_lookup(false);
        record_rotation("file");
        record_rotation_check_failure();
    }
}
